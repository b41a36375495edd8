//! Evolution layer - the genetic algorithm that searches for short tours.

#![warn(missing_docs, unused_crate_dependencies)]

mod operators;
mod hall_of_fame;
mod observer;
mod engine;

pub use operators::{
    ordered_crossover, select_tournament, shuffle_indexes, shuffle_indexes_with, CrossoverFn,
    MutateFn, Operators, SelectFn, GENE_SWAP_PROBABILITY, TOURNAMENT_SIZE,
};
pub use hall_of_fame::HallOfFame;
pub use observer::{ChannelObserver, LoggingObserver, ProgressEvent, ProgressObserver};
pub use engine::{transport_for, EvolutionEngine, EvolutionError, Result, RunOutcome};
