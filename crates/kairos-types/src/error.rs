//! Codec error types.

use thiserror::Error;

/// Errors arising from binary encoding and decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Deserialization failed.
    #[error("Deserialize error: {0}")]
    Deserialize(String),

    /// A fixed-size field had the wrong length.
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
