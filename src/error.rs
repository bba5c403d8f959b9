//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Logical key is empty or otherwise unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Backend probe failed
    #[error("Storage unsupported: {0}")]
    Unsupported(String),

    /// Backend capacity exhausted on write
    #[error("Storage quota exceeded: {requested} bytes requested, quota is {quota} bytes")]
    QuotaExceeded { requested: usize, quota: usize },

    /// Stored record is not a valid entry
    #[error("Malformed entry: {0}")]
    MalformedEntry(String),

    /// Authentication tag mismatch or cipher failure
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// No backend exists in the current execution context
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Errors the caller can act on and that therefore escape the engine.
    pub fn is_caller_actionable(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKey(_) | CacheError::Unsupported(_) | CacheError::QuotaExceeded { .. }
        )
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            CacheError::QuotaExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            CacheError::Unsupported(_) | CacheError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::MalformedEntry(_) | CacheError::Decryption(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Internal(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
