//! Point-to-point message links - the only seam between the coordinator and
//! its workers.

use crate::Message;
use async_trait::async_trait;
use salesman_core::WorkerId;

/// Result alias for link operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while moving messages between nodes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other side went away
    #[error("peer disconnected")]
    Closed,

    /// Send addressed to a worker the link does not know
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),

    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame that could not be understood
    #[error("malformed frame: {0}")]
    Decode(String),

    /// Encoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coordinator end of the cluster: one channel to each worker, one shared
/// inbox fed by all of them.
#[async_trait]
pub trait CoordinatorLink: Send {
    /// Number of workers reachable through this link.
    fn worker_count(&self) -> usize;

    /// Send a message to one worker.
    async fn send(&mut self, worker: WorkerId, message: Message) -> Result<()>;

    /// Wait for the next message from any worker.
    async fn recv(&mut self) -> Result<(WorkerId, Message)>;
}

/// Worker end of the cluster.
#[async_trait]
pub trait WorkerLink: Send {
    /// Send a message to the coordinator.
    async fn send(&mut self, message: Message) -> Result<()>;

    /// Wait for the next message from the coordinator.
    ///
    /// Returns [`TransportError::Closed`] once the coordinator is gone.
    async fn recv(&mut self) -> Result<Message>;
}
