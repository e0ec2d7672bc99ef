//! Error types for the decksync-ingest HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SyncRunResult;
use crate::services::SyncFailure;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a sync is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or wrong trigger token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Run aborted by a fatal error (503); carries the partial result
    #[error("Sync failed: {message}")]
    SyncFailed {
        code: &'static str,
        message: String,
        partial: Box<SyncRunResult>,
    },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<SyncFailure> for ApiError {
    fn from(failure: SyncFailure) -> Self {
        ApiError::SyncFailed {
            code: failure.error.code(),
            message: failure.error.to_string(),
            partial: Box::new(failure.partial),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::SyncFailed {
                code,
                message,
                partial,
            } => {
                let body = Json(json!({
                    "error": {
                        "code": code,
                        "message": message,
                    },
                    "partial": partial,
                }));
                return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
