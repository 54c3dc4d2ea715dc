//! Network error types.

use thiserror::Error;

/// Network errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer stopped or stream closed.
    #[error("Peer closed")]
    PeerClosed,

    /// A frame could not be decoded.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame exceeds the size limit.
    #[error("Frame too large: {size} bytes, max {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer not found in the connected set.
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Send queue full.
    #[error("Send queue full for peer {0}")]
    QueueFull(String),

    /// Timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization error.
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
