// =============================================================================
// Bearer Token Authentication — Axum Middleware
// =============================================================================
//
// Extracts and validates a Bearer token from the `Authorization` header. The
// expected token is read from the `MARKET_API_TOKEN` environment variable.
// Comparison is performed in constant time to prevent timing side-channels.
//
// Usage as an Axum extractor:
//
//   async fn handler(AuthBearer(token): AuthBearer, ...) { ... }
//
// If the token is missing or invalid, the extractor short-circuits the
// request with a 403 Forbidden response before the handler body executes.
// =============================================================================

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Axum extractor that validates the `Authorization: Bearer <token>` header
/// against the `MARKET_API_TOKEN` environment variable.
pub struct AuthBearer(pub String);

pub struct AuthRejection {
    status: StatusCode,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, axum::Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let expected = std::env::var("MARKET_API_TOKEN").unwrap_or_default();
        if expected.is_empty() {
            warn!("MARKET_API_TOKEN is not set — all authenticated requests will be rejected");
            return Err(AuthRejection { status: StatusCode::FORBIDDEN, message: "server authentication not configured" });
        }

        let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        let token = match auth_header {
            Some(value) if value.starts_with("Bearer ") => &value[7..],
            _ => {
                warn!("missing or malformed Authorization header");
                return Err(AuthRejection { status: StatusCode::FORBIDDEN, message: "missing or invalid authorization token" });
            }
        };

        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            warn!("invalid token presented");
            return Err(AuthRejection { status: StatusCode::FORBIDDEN, message: "invalid authorization token" });
        }

        Ok(AuthBearer(token.to_string()))
    }
}

/// Validate a token string against `MARKET_API_TOKEN`. Intended for contexts
/// where the Axum extractor is not usable (WebSocket upgrade query-param auth).
pub fn validate_token(token: &str) -> bool {
    let expected = std::env::var("MARKET_API_TOKEN").unwrap_or_default();
    if expected.is_empty() {
        return false;
    }
    constant_time_eq(token.as_bytes(), expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_identical() {
        assert!(constant_time_eq(b"hello", b"hello"));
    }

    #[test]
    fn constant_time_eq_different() {
        assert!(!constant_time_eq(b"hello", b"world"));
    }

    #[test]
    fn constant_time_eq_different_lengths() {
        assert!(!constant_time_eq(b"short", b"longer_string"));
    }

    #[test]
    fn validate_token_rejects_when_unset() {
        std::env::remove_var("MARKET_API_TOKEN_TEST_UNUSED");
        assert!(!validate_token("anything"));
    }
}
