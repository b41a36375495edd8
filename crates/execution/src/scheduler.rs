//! Coordinator-side task distribution.
//!
//! A batch of tours is fragmented into tasks and handed out one per worker;
//! whichever worker replies first gets the next unsent task. Each worker
//! holds at most one outstanding task, so faster workers naturally receive
//! more of the batch.

use crate::{CoordinatorLink, Message, Task, TaskResult, TransportError};
use salesman_core::{DistanceMatrix, Role, WorkerId};
use std::time::Duration;
use tracing::{debug, debug_span, info, warn, Instrument};

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors that abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Link failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No reply within the configured bound
    #[error("no reply from any worker within {0:?}")]
    ReplyTimeout(Duration),

    /// Nobody to send work to
    #[error("worker pool is empty")]
    NoWorkers,

    /// Result index outside the batch
    #[error("result index {index} out of range for batch of {len}")]
    IndexOutOfRange {
        /// Reported index
        index: i64,
        /// Batch length
        len: usize,
    },

    /// Result for a task the worker was not holding
    #[error("{worker} returned index {index} while holding {held:?}")]
    UnexpectedResult {
        /// Sender
        worker: WorkerId,
        /// Reported index
        index: i64,
        /// Index the worker was actually assigned
        held: Option<usize>,
    },

    /// Second result for the same index
    #[error("duplicate result for index {0}")]
    DuplicateResult(usize),

    /// A slot left empty after the batch drained
    #[error("no result recorded for index {0}")]
    MissingResult(usize),
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerConfig {
    /// Upper bound on the wait for any single reply. `None` waits forever,
    /// so a worker that never answers stalls the batch.
    pub reply_timeout: Option<Duration>,
}

impl SchedulerConfig {
    /// Create the default configuration (no reply timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail a batch when no reply arrives within `timeout`.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }
}

/// How the last batch was spread across the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tasks sent to each worker, indexed by worker id
    pub assignments: Vec<usize>,
}

impl DispatchReport {
    fn new(workers: usize) -> Self {
        Self {
            assignments: vec![0; workers],
        }
    }

    /// Tasks `worker` received.
    pub fn tasks_for(&self, worker: WorkerId) -> usize {
        self.assignments.get(worker.index()).copied().unwrap_or(0)
    }

    /// Tasks sent in total.
    pub fn total(&self) -> usize {
        self.assignments.iter().sum()
    }
}

/// Hands evaluation tasks to a worker pool and gathers the results.
pub struct Scheduler<L: CoordinatorLink> {
    link: L,
    config: SchedulerConfig,
    last_dispatch: DispatchReport,
    batches: u64,
}

impl<L: CoordinatorLink> Scheduler<L> {
    /// Create a scheduler over `link`.
    pub fn new(link: L) -> Self {
        Self {
            link,
            config: SchedulerConfig::default(),
            last_dispatch: DispatchReport::default(),
            batches: 0,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Side of the topology the scheduler plays.
    pub fn role(&self) -> Role {
        Role::Coordinator
    }

    /// Size of the worker pool.
    pub fn worker_count(&self) -> usize {
        self.link.worker_count()
    }

    /// Distribution of the most recent batch.
    pub fn last_dispatch(&self) -> &DispatchReport {
        &self.last_dispatch
    }

    /// Batches evaluated so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Send `matrix` to every worker. Workers cache it until the next update.
    ///
    /// Links deliver in order, so any task sent afterwards is processed
    /// against this matrix.
    pub async fn broadcast_matrix(&mut self, matrix: &DistanceMatrix) -> Result<()> {
        let workers = self.link.worker_count();
        info!(
            role = %self.role(),
            "Broadcasting {0}x{0} matrix to {1} workers",
            matrix.size(),
            workers
        );

        for worker in (0..workers).map(WorkerId) {
            self.link
                .send(worker, Message::MatrixUpdate(matrix.clone()))
                .await?;
            debug!("Matrix sent to {}", worker);
        }
        Ok(())
    }

    /// Tell every worker there is no current work. Workers keep running.
    pub async fn terminate(&mut self) -> Result<()> {
        let workers = self.link.worker_count();
        info!(role = %self.role(), "Sending terminate to {} workers", workers);

        for worker in (0..workers).map(WorkerId) {
            self.link.send(worker, Message::Terminate).await?;
        }
        Ok(())
    }

    /// Evaluate `tours` on the pool. Returns fitness values in the order of
    /// `tours`, blocking until every result has arrived.
    pub async fn evaluate(&mut self, tours: &[&[usize]]) -> Result<Vec<f64>> {
        let span = debug_span!("batch", role = %self.role(), batch = self.batches + 1);
        self.evaluate_batch(tours).instrument(span).await
    }

    async fn evaluate_batch(&mut self, tours: &[&[usize]]) -> Result<Vec<f64>> {
        let workers = self.link.worker_count();
        if workers == 0 {
            return Err(SchedulerError::NoWorkers);
        }

        let mut report = DispatchReport::new(workers);
        let mut results: Vec<Option<f64>> = vec![None; tours.len()];
        let mut holding: Vec<Option<usize>> = vec![None; workers];
        let mut next = 0;

        let initial = workers.min(tours.len());
        debug!("Distributing {} tasks across {} workers", tours.len(), initial);

        for worker in (0..initial).map(WorkerId) {
            self.dispatch(worker, next, tours[next], &mut holding, &mut report)
                .await?;
            next += 1;
        }

        let mut outstanding = initial;
        while outstanding > 0 {
            let (worker, message) = self.next_reply().await?;
            let result = match message {
                Message::Result(result) => result,
                other => {
                    warn!("Ignoring {:?} frame from {}", other.tag(), worker);
                    continue;
                }
            };

            let index = accept_result(worker, result, &mut holding, &mut results)?;
            debug!("{} finished task {} (fitness {})", worker, index, result.fitness);

            if next < tours.len() {
                self.dispatch(worker, next, tours[next], &mut holding, &mut report)
                    .await?;
                next += 1;
            } else {
                self.link
                    .send(worker, Message::Task(Task::end_of_batch()))
                    .await?;
                outstanding -= 1;
            }
        }

        self.batches += 1;
        self.last_dispatch = report;

        results
            .into_iter()
            .enumerate()
            .map(|(index, fitness)| fitness.ok_or(SchedulerError::MissingResult(index)))
            .collect()
    }

    async fn dispatch(
        &mut self,
        worker: WorkerId,
        index: usize,
        tour: &[usize],
        holding: &mut [Option<usize>],
        report: &mut DispatchReport,
    ) -> Result<()> {
        self.link
            .send(worker, Message::Task(Task::new(index, tour.to_vec())))
            .await?;
        holding[worker.index()] = Some(index);
        report.assignments[worker.index()] += 1;
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<(WorkerId, Message)> {
        match self.config.reply_timeout {
            Some(limit) => tokio::time::timeout(limit, self.link.recv())
                .await
                .map_err(|_| SchedulerError::ReplyTimeout(limit))?
                .map_err(SchedulerError::from),
            None => Ok(self.link.recv().await?),
        }
    }

    /// Give the link back, e.g. to reuse the pool for another scheduler.
    pub fn into_link(self) -> L {
        self.link
    }
}

/// Record `result` if it answers the task `worker` holds. Returns the index.
fn accept_result(
    worker: WorkerId,
    result: TaskResult,
    holding: &mut [Option<usize>],
    results: &mut [Option<f64>],
) -> Result<usize> {
    if result.index < 0 || result.index as usize >= results.len() {
        return Err(SchedulerError::IndexOutOfRange {
            index: result.index,
            len: results.len(),
        });
    }
    let index = result.index as usize;

    let held = holding.get_mut(worker.index()).ok_or(SchedulerError::UnexpectedResult {
        worker,
        index: result.index,
        held: None,
    })?;
    if *held != Some(index) {
        return Err(SchedulerError::UnexpectedResult {
            worker,
            index: result.index,
            held: *held,
        });
    }
    *held = None;

    let slot = &mut results[index];
    if slot.is_some() {
        return Err(SchedulerError::DuplicateResult(index));
    }
    *slot = Some(result.fitness);
    Ok(index)
}
