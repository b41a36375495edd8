//! Salesman core data models.
//!
//! Distance matrices, candidate tours, fitness and statistics shared by the
//! coordinator, the workers and the persistence layer.

#![warn(missing_docs)]

// Identities
mod id;
mod role;

// Problem instance and candidates
mod matrix;
mod individual;
mod fitness;

// Run bookkeeping
mod config;
mod stats;
mod run;
mod error;

// Re-exports
pub use id::{RunId, WorkerId};
pub use role::Role;

pub use matrix::{DistanceMatrix, MatrixError, MAP_SIZE};
pub use individual::{is_permutation, Individual, Population};
pub use fitness::{tour_cost, FitnessFn, UNFIT};

pub use config::{
    EvolutionConfig, DEFAULT_CROSSOVER_RATE, DEFAULT_GENERATIONS, DEFAULT_MUTATION_RATE,
    DEFAULT_POP_SIZE, DEFAULT_SEED, MIN_CITIES, MIN_POP_SIZE,
};
pub use stats::GenerationRecord;
pub use run::{RunParameters, RunRecord};
pub use error::{CoreError, Result};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
