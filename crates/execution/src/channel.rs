//! In-process cluster over tokio channels.
//!
//! Used when the worker pool lives inside the coordinator's process, and by
//! tests. Channels deliver in send order per sender/receiver pair, the same
//! guarantee the TCP links give.

use crate::{CoordinatorLink, Message, Result, TransportError, WorkerLink};
use async_trait::async_trait;
use salesman_core::WorkerId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Build a cluster of `workers` workers wired to one coordinator.
pub fn cluster(workers: usize) -> (ChannelCoordinator, Vec<ChannelWorker>) {
    let (inbox_tx, inbox_rx) = unbounded_channel();

    let mut outboxes = Vec::with_capacity(workers);
    let mut links = Vec::with_capacity(workers);
    for id in (0..workers).map(WorkerId) {
        let (tx, rx) = unbounded_channel();
        outboxes.push(tx);
        links.push(ChannelWorker {
            id,
            inbox: rx,
            outbox: inbox_tx.clone(),
        });
    }

    let coordinator = ChannelCoordinator {
        outboxes,
        inbox: inbox_rx,
    };
    (coordinator, links)
}

/// Coordinator end of an in-process cluster.
pub struct ChannelCoordinator {
    outboxes: Vec<UnboundedSender<Message>>,
    inbox: UnboundedReceiver<(WorkerId, Message)>,
}

#[async_trait]
impl CoordinatorLink for ChannelCoordinator {
    fn worker_count(&self) -> usize {
        self.outboxes.len()
    }

    async fn send(&mut self, worker: WorkerId, message: Message) -> Result<()> {
        let outbox = self
            .outboxes
            .get(worker.index())
            .ok_or(TransportError::UnknownWorker(worker))?;
        outbox.send(message).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<(WorkerId, Message)> {
        self.inbox.recv().await.ok_or(TransportError::Closed)
    }
}

/// Worker end of an in-process cluster.
pub struct ChannelWorker {
    id: WorkerId,
    inbox: UnboundedReceiver<Message>,
    outbox: UnboundedSender<(WorkerId, Message)>,
}

impl ChannelWorker {
    /// Id the coordinator knows this worker by.
    pub fn id(&self) -> WorkerId {
        self.id
    }
}

#[async_trait]
impl WorkerLink for ChannelWorker {
    async fn send(&mut self, message: Message) -> Result<()> {
        self.outbox
            .send((self.id, message))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Message> {
        self.inbox.recv().await.ok_or(TransportError::Closed)
    }
}
