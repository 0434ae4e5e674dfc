//! Error types and handling
//!
//! Every handler error becomes a JSON body `{"error", "message"}`, except
//! rate limiting which answers in plain text with a `Retry-After` header.
//! Internal failures are logged in full and reported with a generic message.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::services::VaultError;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized - authentication required or failed (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden - insufficient scope (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict - resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unprocessable entity - validation failed (422)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Too many requests (429)
    #[error("Rate limit exceeded")]
    TooManyRequests { retry_after_secs: u64 },

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable, retryable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::TooManyRequests { retry_after_secs } = self {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (header::RETRY_AFTER, retry_after_secs.to_string()),
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                ],
                "Rate limit exceeded",
            )
                .into_response();
        }

        let (status, error_type) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::ValidationError(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
        };

        let message = match &self {
            AppError::Internal(_) => {
                error!(error = %self, error_type = error_type, "Request error");
                "An internal error occurred".to_string()
            }
            AppError::ServiceUnavailable(_) => {
                warn!(error = %self, error_type = error_type, "Request error");
                "The service is temporarily unavailable, please retry".to_string()
            }
            AppError::Forbidden(_) => {
                warn!(error = %self, error_type = error_type, "Request error");
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Validation(msg) => AppError::ValidationError(msg),
            VaultError::Authentication(msg) => AppError::Unauthorized(msg),
            VaultError::Authorization(msg) => AppError::Forbidden(msg),
            VaultError::RateLimited {
                retry_after_secs, ..
            } => AppError::TooManyRequests { retry_after_secs },
            VaultError::Decryption => AppError::Internal("stored secret failed to decrypt".to_string()),
            VaultError::NotFound(msg) => AppError::NotFound(msg),
            VaultError::Conflict(msg) => AppError::Conflict(msg),
            VaultError::Timeout(what) => AppError::ServiceUnavailable(format!("{} timed out", what)),
            VaultError::Storage(e) => AppError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
