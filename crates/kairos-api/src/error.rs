//! API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request payload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Hex decoding of a submitted transaction failed.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Binary deserialization of a submitted transaction failed.
    #[error("Deserialize failed: {0}")]
    DeserializeFailed(String),

    /// Transaction signature rejected.
    #[error("Signature verification failed")]
    SignatureFailed,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Chain store error.
    #[error("Chain error: {0}")]
    Chain(#[from] kairos_chain::ChainError),

    /// Mempool error.
    #[error("Mempool error: {0}")]
    Mempool(#[from] kairos_mempool::MempoolError),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: u16,
    reason: String,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            ApiError::DecodeFailed(_) => (StatusCode::BAD_REQUEST, "Decode Failed"),
            ApiError::DeserializeFailed(_) => (StatusCode::BAD_REQUEST, "Deserialize Failed"),
            ApiError::SignatureFailed => (StatusCode::BAD_REQUEST, "Signature Failed"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            ApiError::Chain(kairos_chain::ChainError::NotFound) => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            ApiError::Chain(kairos_chain::ChainError::OutOfRange { .. }) => {
                (StatusCode::NOT_FOUND, "Out Of Range")
            }
            ApiError::Chain(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Chain Error"),
            ApiError::Mempool(_) => (StatusCode::BAD_REQUEST, "Mempool Error"),
        };

        let body = ErrorResponse {
            error: status.as_u16(),
            reason: reason.to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
