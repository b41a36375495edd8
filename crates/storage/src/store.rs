//! Run history storage abstraction.

use async_trait::async_trait;
use salesman_core::{MatrixError, RunId, RunRecord};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Loaded grid is not a valid distance matrix
    #[error("malformed matrix: {0}")]
    Matrix(#[from] MatrixError),

    /// Text matrix token that is not a number
    #[error("line {line}: cannot parse {token:?} as a distance")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Offending token
        token: String,
    },
}

/// Persistence for finished runs.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Save a run. Returns its id.
    async fn save_run(&self, record: &RunRecord) -> Result<RunId>;

    /// Load one run.
    async fn load_run(&self, id: RunId) -> Result<Option<RunRecord>>;

    /// Most recent runs first, at most `limit` of them.
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>>;
}
