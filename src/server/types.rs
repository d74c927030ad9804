//! Front end data structures.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error_handling::{LookupError, RateLimitError};
use crate::locator::IpLocator;
use crate::rate_limiter::RateLimiter;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolves addresses to locations
    pub locator: Arc<IpLocator>,
    /// `None` when the limiter is disabled
    pub limiter: Option<Arc<dyn RateLimiter>>,
    /// Reported by `/version`
    pub version: &'static str,
}

/// JSON envelope of every JSON response: `{"error": "...", "content": ...}`.
///
/// `error` is empty on success; `content` is null on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Error message, empty on success
    pub error: String,
    /// Payload, `None` on failure
    pub content: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Successful envelope around `content`.
    pub fn ok(content: T) -> Self {
        ApiResponse {
            error: String::new(),
            content: Some(content),
        }
    }

    /// Failed envelope carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            error: message.into(),
            content: None,
        }
    }
}

/// JSON response for `/version`
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Crate version
    pub version: String,
}

/// Failures surfaced to HTTP callers.
#[derive(Debug)]
pub enum ApiError {
    /// The address could not be resolved.
    Lookup(LookupError),
    /// The limiter rejected the caller or failed.
    RateLimit(RateLimitError),
    /// Request carried a `Content-Type` the route does not serve.
    UnsupportedContentType(String),
}

impl ApiError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lookup(LookupError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            ApiError::Lookup(LookupError::NotCovered(_)) => StatusCode::NOT_FOUND,
            ApiError::Lookup(LookupError::StoreUnavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimit(RateLimitError::Exceeded) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::RateLimit(RateLimitError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::UnsupportedContentType(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Text placed in the envelope's `error` field.
    pub fn message(&self) -> String {
        match self {
            ApiError::Lookup(e) => e.to_string(),
            ApiError::RateLimit(e) => e.to_string(),
            ApiError::UnsupportedContentType(c) => format!("content type not implemented: {c}"),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        ApiError::Lookup(e)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        ApiError::RateLimit(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!("Request failed: {}", self.message());
        } else {
            log::debug!("Request rejected: {}", self.message());
        }
        (status, Json(ApiResponse::<()>::failure(self.message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::DatabaseError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ApiError::from(LookupError::InvalidAddress("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LookupError::NotCovered("10.0.0.1".parse().unwrap())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(LookupError::StoreUnavailable(DatabaseError::Timeout(
                    Duration::from_secs(5),
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(RateLimitError::Exceeded),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::UnsupportedContentType("text/xml".into()),
                StatusCode::NOT_IMPLEMENTED,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn test_envelope_shape() {
        let ok = serde_json::to_value(ApiResponse::ok(VersionInfo {
            version: "1.0.0".into(),
        }))
        .unwrap();
        assert_eq!(ok["error"], "");
        assert_eq!(ok["content"]["version"], "1.0.0");

        let failed = serde_json::to_value(ApiResponse::<()>::failure("boom")).unwrap();
        assert_eq!(failed["error"], "boom");
        assert!(failed["content"].is_null());
    }
}
