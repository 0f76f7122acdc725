// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Covers the engine failure taxonomy and maps it to HTTP responses for the sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // 404 Not Found: attempt does not exist or no attempt id was supplied
    AttemptNotFound(String),

    // 401 Unauthorized
    Unauthenticated(String),

    // 401 Unauthorized (credential was valid but has lapsed)
    SessionExpired(String),

    // 502 Bad Gateway: fetch or submit could not reach the grading service
    NetworkFailure(String),

    // 412 Precondition Failed: not recorded as a violation
    FullscreenDenied(String),

    // 400 Bad Request: rejected locally, never reaches the network
    ValidationFailure(String),

    // 409 Conflict
    InvalidTransition { from: String, action: String },

    // 500 Internal Server Error
    Storage(String),
    Config(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::AttemptNotFound(msg) => write!(f, "attempt not found: {}", msg),
            AppError::Unauthenticated(msg) => write!(f, "unauthenticated: {}", msg),
            AppError::SessionExpired(msg) => write!(f, "session expired: {}", msg),
            AppError::NetworkFailure(msg) => write!(f, "network failure: {}", msg),
            AppError::FullscreenDenied(msg) => write!(f, "fullscreen denied: {}", msg),
            AppError::ValidationFailure(msg) => write!(f, "validation failure: {}", msg),
            AppError::InvalidTransition { from, action } => {
                write!(f, "cannot {} while {}", action, from)
            }
            AppError::Storage(msg) => write!(f, "storage error: {}", msg),
            AppError::Config(msg) => write!(f, "configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Loading-time failures that must not be retried automatically.
    pub fn is_terminal_load_failure(&self) -> bool {
        matches!(
            self,
            AppError::AttemptNotFound(_) | AppError::Unauthenticated(_) | AppError::SessionExpired(_)
        )
    }
}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::AttemptNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_) | AppError::SessionExpired(_) => StatusCode::UNAUTHORIZED,
            AppError::NetworkFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::FullscreenDenied(_) => StatusCode::PRECONDITION_FAILED,
            AppError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Storage(msg) | AppError::Config(msg) | AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// Transport-level failures talking to the grading service.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkFailure(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationFailure(err.to_string())
    }
}
