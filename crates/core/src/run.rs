//! Records of finished runs, as handed to persistence.

use crate::{RunId, Time};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters a run was executed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Population size
    pub pop_size: usize,
    /// Crossover probability
    pub crossover_rate: f64,
    /// Mutation probability
    pub mutation_rate: f64,
    /// Generations evolved
    pub generations: usize,
    /// Cities in the instance
    pub num_cities: usize,
}

/// A finished run: best tour found and how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier
    pub id: RunId,
    /// Best tour seen across all generations
    pub best_route: Vec<usize>,
    /// Its cost
    pub best_distance: f64,
    /// Parameters of the run
    pub parameters: RunParameters,
    /// Wall time of the run in seconds
    pub elapsed_secs: f64,
    /// When the record was created
    pub created_at: Time,
}

impl RunRecord {
    /// Create a record for a run that just finished.
    pub fn new(
        best_route: Vec<usize>,
        best_distance: f64,
        parameters: RunParameters,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: RunId::new(),
            best_route,
            best_distance,
            parameters,
            elapsed_secs: elapsed.as_secs_f64(),
            created_at: chrono::Utc::now(),
        }
    }
}
