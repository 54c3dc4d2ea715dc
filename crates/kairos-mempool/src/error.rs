//! Mempool error types.

use thiserror::Error;

/// Errors from pool operations.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already pooled.
    #[error("Transaction already exists: {0}")]
    AlreadyExists(String),

    /// Pool is at capacity and nothing could be evicted.
    #[error("Pool full: {count} transactions, max {max}")]
    Full { count: usize, max: usize },

    /// The stored content hash does not match the body.
    #[error("Content hash mismatch: {0}")]
    HashMismatch(String),
}

/// Result type for pool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
