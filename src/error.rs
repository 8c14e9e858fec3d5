// =============================================================================
// Error taxonomy — typed service errors crossing the HTTP boundary
// =============================================================================
//
// Service methods never panic on downstream failure; they translate into one
// of these variants, which the HTTP adapter maps to a status code exactly
// once, at the edge.
// =============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

/// The typed error surface returned by every service method in this crate.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("authentication error: {message}")]
    Authentication { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("circuit open for {resource}")]
    CircuitOpen { resource: String },

    #[error("unavailable: {message}")]
    Unavailable { message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to an end user (no internal detail leakage).
    fn user_message(&self) -> String {
        match self {
            Self::Internal { .. } => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    user_message: String,
    retryable: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            user_message: self.user_message(),
            retryable: false,
        };
        (status, axum::Json(json!(body))).into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
