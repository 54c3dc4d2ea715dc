//! Chain store error types.

use kairos_storage::StorageError;
use thiserror::Error;

/// Errors from chain store operations.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Block or transaction not present in cache or store.
    #[error("Not found")]
    NotFound,

    /// Requested height is beyond the current tip.
    #[error("Height {height} out of range, latest is {latest}")]
    OutOfRange { height: u64, latest: i64 },

    /// Serialization failed.
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Deserialization of stored bytes failed.
    #[error("Deserialize error: {0}")]
    Deserialize(String),

    /// Underlying storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    /// The writer channel is gone; the node is shutting down.
    #[error("Writer queue closed")]
    WriterClosed,
}

/// Result type for chain store operations.
pub type ChainResult<T> = Result<T, ChainError>;
