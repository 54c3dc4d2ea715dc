//! Sync error types.

use thiserror::Error;

/// Errors from the block synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A reply's parent hash does not match the local tip.
    #[error("Parent mismatch at height {height}")]
    ParentMismatch { height: u64 },

    /// No connected peer reports the requested height.
    #[error("No peer for height {height}")]
    NoPeer { height: u64 },

    /// A request timed out.
    #[error("Timeout waiting for height {height}")]
    Timeout { height: u64 },

    /// The chain store rejected an insert.
    #[error("Chain error: {0}")]
    Chain(#[from] kairos_chain::ChainError),

    /// The command channel is gone; the node is shutting down.
    #[error("Command channel closed")]
    ChannelClosed,
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
