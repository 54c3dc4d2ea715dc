//! Crypto error types.

use thiserror::Error;

/// Errors from key handling, signatures and VRF checks.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Underlying secp256k1 failure.
    #[error("secp256k1 error: {0}")]
    Secp(#[from] secp256k1::Error),

    /// A public key could not be parsed from its compressed bytes.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// A scalar was zero, out of range or the wrong length.
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),

    /// A curve point could not be reconstructed.
    #[error("Invalid curve point")]
    InvalidPoint,

    /// Verification failed structurally (not merely "false").
    #[error("Verify error: {0}")]
    Verify(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
