//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger::LedgerError;
use runtime::RuntimeError;
use saga::ClientError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request lost a race it cannot win by retrying as-is.
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::NotVisibleAfterRetries { .. } => ApiError::Conflict(err.to_string()),
            ClientError::Runtime(RuntimeError::NotFound(_)) => ApiError::NotFound(err.to_string()),
            ClientError::Runtime(RuntimeError::AlreadyExists(_)) => {
                ApiError::Conflict(err.to_string())
            }
            ClientError::Runtime(_) => ApiError::Internal(err.to_string()),
            ClientError::Serialization(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
