//! Fitness evaluation backends.
//!
//! The evolution loop only sees [`EvaluationTransport`]; whether tours are
//! scored in-process or on a worker pool is decided when the transport is
//! built.

use crate::channel::{cluster, ChannelCoordinator};
use crate::{CoordinatorLink, Scheduler, SchedulerError, WorkerAgent};
use async_trait::async_trait;
use salesman_core::{DistanceMatrix, FitnessFn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors raised while evaluating a batch.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// `map` called before `install_matrix`
    #[error("no distance matrix installed")]
    MissingMatrix,

    /// Distributed batch failed
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Maps a fitness function over a batch of tours.
#[async_trait]
pub trait EvaluationTransport: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Workers behind this transport, 0 for in-process evaluation.
    fn worker_count(&self) -> usize;

    /// Make `matrix` the one every following `map` scores against.
    async fn install_matrix(&mut self, matrix: Arc<DistanceMatrix>)
        -> Result<(), EvaluationError>;

    /// Score every tour. Results are in input order and have the same length.
    async fn map(
        &mut self,
        fitness: FitnessFn,
        tours: &[&[usize]],
    ) -> Result<Vec<f64>, EvaluationError>;

    /// Signal that the current run is over.
    async fn finish_run(&mut self) -> Result<(), EvaluationError>;
}

/// Evaluates in the calling task.
#[derive(Debug, Default)]
pub struct LocalTransport {
    matrix: Option<Arc<DistanceMatrix>>,
}

impl LocalTransport {
    /// Create a transport with no matrix installed.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvaluationTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    fn worker_count(&self) -> usize {
        0
    }

    async fn install_matrix(
        &mut self,
        matrix: Arc<DistanceMatrix>,
    ) -> Result<(), EvaluationError> {
        self.matrix = Some(matrix);
        Ok(())
    }

    async fn map(
        &mut self,
        fitness: FitnessFn,
        tours: &[&[usize]],
    ) -> Result<Vec<f64>, EvaluationError> {
        let matrix = self.matrix.as_deref().ok_or(EvaluationError::MissingMatrix)?;
        Ok(tours.iter().map(|tour| fitness(tour, matrix)).collect())
    }

    async fn finish_run(&mut self) -> Result<(), EvaluationError> {
        Ok(())
    }
}

/// Evaluates on a worker pool through a [`Scheduler`].
///
/// Workers score with the fitness function they were started with, so the
/// `fitness` argument to [`EvaluationTransport::map`] is not used here.
pub struct DistributedTransport<L: CoordinatorLink> {
    scheduler: Scheduler<L>,
    installed: bool,
    workers: Vec<JoinHandle<()>>,
}

impl<L: CoordinatorLink> DistributedTransport<L> {
    /// Wrap an existing scheduler, e.g. one over TCP links.
    pub fn new(scheduler: Scheduler<L>) -> Self {
        Self {
            scheduler,
            installed: false,
            workers: Vec::new(),
        }
    }

    /// The scheduler, for dispatch statistics.
    pub fn scheduler(&self) -> &Scheduler<L> {
        &self.scheduler
    }
}

impl DistributedTransport<ChannelCoordinator> {
    /// Start `workers` in-process worker tasks and wrap them.
    pub fn spawn_local(workers: usize, fitness: FitnessFn) -> Self {
        let (link, links) = cluster(workers);
        let handles = links
            .into_iter()
            .map(|link| {
                let agent = WorkerAgent::new(link.id(), link).with_fitness(fitness);
                tokio::spawn(async move {
                    if let Err(e) = agent.run().await {
                        warn!("Worker stopped: {}", e);
                    }
                })
            })
            .collect();

        Self {
            scheduler: Scheduler::new(link),
            installed: false,
            workers: handles,
        }
    }

    /// Close the links and wait for the in-process workers to exit.
    pub async fn shutdown(self) {
        let Self { scheduler, workers, .. } = self;
        drop(scheduler);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Worker task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl<L: CoordinatorLink> EvaluationTransport for DistributedTransport<L> {
    fn name(&self) -> &'static str {
        "distributed"
    }

    fn worker_count(&self) -> usize {
        self.scheduler.worker_count()
    }

    async fn install_matrix(
        &mut self,
        matrix: Arc<DistanceMatrix>,
    ) -> Result<(), EvaluationError> {
        self.scheduler.broadcast_matrix(&matrix).await?;
        self.installed = true;
        Ok(())
    }

    async fn map(
        &mut self,
        _fitness: FitnessFn,
        tours: &[&[usize]],
    ) -> Result<Vec<f64>, EvaluationError> {
        if !self.installed {
            return Err(EvaluationError::MissingMatrix);
        }
        let results = self.scheduler.evaluate(tours).await?;
        debug!(
            "Batch of {} spread as {:?}",
            tours.len(),
            self.scheduler.last_dispatch().assignments
        );
        Ok(results)
    }

    async fn finish_run(&mut self) -> Result<(), EvaluationError> {
        self.scheduler.terminate().await?;
        self.installed = false;
        Ok(())
    }
}
