//! Worker-side message loop.
//!
//! ```text
//! AwaitingMatrix --MatrixUpdate--> Idle --Task--> Busy --Result sent--> Idle
//!                                   ^                                     |
//!                                   +------------- Terminate -------------+
//! ```
//!
//! A worker never leaves the loop on Terminate; it only stops once the
//! coordinator side of the link is gone.

use crate::{Message, Result, Task, TaskResult, TransportError, WorkerLink};
use salesman_core::{is_permutation, tour_cost, DistanceMatrix, FitnessFn, Role, WorkerId, UNFIT};
use tracing::{debug, info, info_span, warn, Instrument};

/// Where a worker is in its message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No matrix received yet
    AwaitingMatrix,
    /// Matrix cached, waiting for work
    Idle,
    /// Computing a fitness value and sending it back. Lasts until the
    /// reply has been handed to the link, whether or not that succeeded.
    Busy,
}

/// Totals reported when a worker shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSummary {
    /// Tasks evaluated since the last terminate signal
    pub tasks_this_run: u64,
    /// Tasks evaluated over the worker's lifetime
    pub tasks_total: u64,
}

/// Evaluates tours on behalf of a coordinator.
pub struct WorkerAgent<L: WorkerLink> {
    id: WorkerId,
    link: L,
    fitness: FitnessFn,
    matrix: Option<DistanceMatrix>,
    state: WorkerState,
    tasks_this_run: u64,
    tasks_total: u64,
}

impl<L: WorkerLink> WorkerAgent<L> {
    /// Create an agent that scores tours with [`tour_cost`].
    pub fn new(id: WorkerId, link: L) -> Self {
        Self {
            id,
            link,
            fitness: tour_cost,
            matrix: None,
            state: WorkerState::AwaitingMatrix,
            tasks_this_run: 0,
            tasks_total: 0,
        }
    }

    /// Use a different fitness function.
    pub fn with_fitness(mut self, fitness: FitnessFn) -> Self {
        self.fitness = fitness;
        self
    }

    /// This worker's id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Side of the topology this agent plays.
    pub fn role(&self) -> Role {
        Role::Worker
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Counters so far.
    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            tasks_this_run: self.tasks_this_run,
            tasks_total: self.tasks_total,
        }
    }

    /// Process messages until the coordinator disconnects. Logs from the
    /// loop carry the agent's role and id.
    pub async fn run(self) -> Result<WorkerSummary> {
        let span = info_span!("agent", role = %self.role(), worker = %self.id);
        self.serve().instrument(span).await
    }

    async fn serve(mut self) -> Result<WorkerSummary> {
        info!("{} started", self.id);

        loop {
            let message = match self.link.recv().await {
                Ok(message) => message,
                Err(TransportError::Closed) => break,
                Err(TransportError::Decode(e)) => {
                    warn!("{} skipping unreadable frame: {}", self.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.handle(message).await {
                Ok(()) => {}
                Err(TransportError::Closed) => break,
                Err(e) => warn!("{} failed to reply: {}", self.id, e),
            }
        }

        info!(
            "{} shutting down after {} tasks",
            self.id, self.tasks_total
        );
        Ok(self.summary())
    }

    /// Process a single message.
    pub async fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::MatrixUpdate(matrix) => {
                debug!("{} cached {}x{} matrix", self.id, matrix.size(), matrix.size());
                self.matrix = Some(matrix);
                self.state = WorkerState::Idle;
            }
            Message::Task(task) => self.evaluate(task).await?,
            Message::Terminate => {
                debug!(
                    "{} received terminate after {} tasks this run",
                    self.id, self.tasks_this_run
                );
                self.tasks_this_run = 0;
            }
            Message::Result(result) => {
                warn!("{} ignoring stray result for index {}", self.id, result.index);
            }
        }
        Ok(())
    }

    async fn evaluate(&mut self, task: Task) -> Result<()> {
        let Some(tour) = task.payload else {
            // End of batch: nothing to answer.
            return Ok(());
        };

        let fitness = match &self.matrix {
            None => {
                warn!("{} got task {} before any matrix", self.id, task.index);
                UNFIT
            }
            Some(matrix) if !is_permutation(&tour, matrix.size()) => {
                warn!(
                    "{} got task {} with an invalid tour of length {}",
                    self.id,
                    task.index,
                    tour.len()
                );
                UNFIT
            }
            Some(matrix) => {
                self.state = WorkerState::Busy;
                (self.fitness)(&tour, matrix)
            }
        };

        self.tasks_this_run += 1;
        self.tasks_total += 1;

        let sent = self
            .link
            .send(Message::Result(TaskResult {
                index: task.index,
                fitness,
            }))
            .await;
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::cluster;
    use crate::CoordinatorLink;

    fn square() -> DistanceMatrix {
        DistanceMatrix::from_rows(vec![
            vec![0.0, 10.0, 15.0, 20.0],
            vec![10.0, 0.0, 35.0, 25.0],
            vec![15.0, 35.0, 0.0, 30.0],
            vec![20.0, 25.0, 30.0, 0.0],
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_task_before_matrix_returns_unfit() {
        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0));
        assert_eq!(agent.state(), WorkerState::AwaitingMatrix);

        agent
            .handle(Message::Task(Task::new(7, vec![0, 1, 2, 3])))
            .await
            .unwrap();

        let (from, reply) = coordinator.recv().await.unwrap();
        assert_eq!(from, WorkerId(0));
        match reply {
            Message::Result(result) => {
                assert_eq!(result.index, 7);
                assert!(result.fitness.is_infinite());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(agent.state(), WorkerState::AwaitingMatrix);
    }

    #[tokio::test]
    async fn test_evaluates_against_cached_matrix() {
        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0));

        agent.handle(Message::MatrixUpdate(square())).await.unwrap();
        assert_eq!(agent.state(), WorkerState::Idle);

        agent
            .handle(Message::Task(Task::new(0, vec![0, 1, 3, 2])))
            .await
            .unwrap();
        let (_, reply) = coordinator.recv().await.unwrap();
        assert_eq!(reply, Message::Result(TaskResult { index: 0, fitness: 80.0 }));
        assert_eq!(agent.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_tour_returns_unfit() {
        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0));
        agent.handle(Message::MatrixUpdate(square())).await.unwrap();

        agent
            .handle(Message::Task(Task::new(3, vec![0, 0, 1, 2])))
            .await
            .unwrap();
        let (_, reply) = coordinator.recv().await.unwrap();
        let Message::Result(result) = reply else { panic!("expected result") };
        assert_eq!(result.index, 3);
        assert_eq!(result.fitness, UNFIT);
    }

    #[tokio::test]
    async fn test_end_of_batch_sends_nothing() {
        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0));
        agent.handle(Message::MatrixUpdate(square())).await.unwrap();

        agent.handle(Message::Task(Task::end_of_batch())).await.unwrap();
        assert_eq!(agent.summary().tasks_total, 0);

        drop(agent);
        assert!(matches!(coordinator.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0));
        agent.handle(Message::MatrixUpdate(square())).await.unwrap();
        agent
            .handle(Message::Task(Task::new(0, vec![0, 1, 2, 3])))
            .await
            .unwrap();
        coordinator.recv().await.unwrap();

        agent.handle(Message::Terminate).await.unwrap();
        agent.handle(Message::Terminate).await.unwrap();

        assert_eq!(agent.state(), WorkerState::Idle);
        assert_eq!(
            agent.summary(),
            WorkerSummary { tasks_this_run: 0, tasks_total: 1 }
        );
    }

    /// Link whose coordinator is already gone.
    struct Unreachable;

    #[async_trait::async_trait]
    impl WorkerLink for Unreachable {
        async fn send(&mut self, _message: Message) -> Result<()> {
            Err(TransportError::Closed)
        }

        async fn recv(&mut self) -> Result<Message> {
            Err(TransportError::Closed)
        }
    }

    #[tokio::test]
    async fn test_failed_reply_returns_to_idle() {
        let mut agent = WorkerAgent::new(WorkerId(0), Unreachable);
        agent.handle(Message::MatrixUpdate(square())).await.unwrap();

        let sent = agent.handle(Message::Task(Task::new(0, vec![0, 1, 3, 2]))).await;
        assert!(matches!(sent, Err(TransportError::Closed)));
        assert_eq!(agent.state(), WorkerState::Idle);
        assert_eq!(agent.summary().tasks_total, 1);
    }

    #[tokio::test]
    async fn test_custom_fitness_reports_as_worker() {
        fn shifted_cost(tour: &[usize], matrix: &DistanceMatrix) -> f64 {
            tour_cost(tour, matrix) + 1.0
        }

        let (mut coordinator, mut links) = cluster(1);
        let mut agent = WorkerAgent::new(WorkerId(0), links.remove(0)).with_fitness(shifted_cost);
        assert_eq!(agent.role(), Role::Worker);
        agent.handle(Message::MatrixUpdate(square())).await.unwrap();

        agent
            .handle(Message::Task(Task::new(5, vec![0, 1, 3, 2])))
            .await
            .unwrap();
        let (_, reply) = coordinator.recv().await.unwrap();
        assert_eq!(reply, Message::Result(TaskResult { index: 5, fitness: 81.0 }));
        assert_eq!(agent.state(), WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_run_skips_non_utf8_frame_over_tcp() {
        use crate::message::encode;
        use crate::TcpWorker;
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let link = TcpWorker::connect(addr).await.unwrap();
            WorkerAgent::new(WorkerId(0), link).run().await
        });

        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
        for message in [
            Message::MatrixUpdate(square()),
            Message::Task(Task::new(6, vec![2, 3, 1, 0])),
        ] {
            let line = encode(&message).unwrap();
            writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
        }
        writer.flush().await.unwrap();

        let mut replies = BufReader::new(reader).lines();
        let line = replies.next_line().await.unwrap().unwrap();
        assert_eq!(
            crate::message::decode(&line).unwrap(),
            Message::Result(TaskResult { index: 6, fitness: 80.0 })
        );
        assert!(!handle.is_finished());

        drop(writer);
        drop(replies);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.tasks_total, 1);
    }

    #[tokio::test]
    async fn test_run_survives_terminate_and_exits_on_close() {
        let (mut coordinator, mut links) = cluster(1);
        let agent = WorkerAgent::new(WorkerId(0), links.remove(0));
        let handle = tokio::spawn(agent.run());

        coordinator.send(WorkerId(0), Message::MatrixUpdate(square())).await.unwrap();
        coordinator.send(WorkerId(0), Message::Terminate).await.unwrap();
        coordinator
            .send(WorkerId(0), Message::Task(Task::new(1, vec![2, 3, 1, 0])))
            .await
            .unwrap();

        let (_, reply) = coordinator.recv().await.unwrap();
        assert_eq!(reply, Message::Result(TaskResult { index: 1, fitness: 80.0 }));

        drop(coordinator);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.tasks_total, 1);
        assert_eq!(summary.tasks_this_run, 1);
    }
}
