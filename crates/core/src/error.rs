//! Errors for the core data model.

use crate::MatrixError;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Configuration and invariant errors detected before or during a run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Population too small to pair parents
    #[error("population size must be at least {min}, got {got}")]
    PopulationTooSmall {
        /// Requested size
        got: usize,
        /// Lower bound
        min: usize,
    },

    /// Too few cities for a meaningful tour
    #[error("at least {min} cities are required, got {got}")]
    TooFewCities {
        /// Cities in the matrix
        got: usize,
        /// Lower bound
        min: usize,
    },

    /// A probability outside `[0, 1]`
    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange {
        /// Parameter name
        name: &'static str,
        /// Rejected value
        value: f64,
    },

    /// Genes that are not a permutation of `0..len`
    #[error("genes are not a permutation of 0..{len}")]
    NotAPermutation {
        /// Tour length
        len: usize,
    },

    /// Malformed distance matrix
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}
