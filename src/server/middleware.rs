//! Request guards: content type restriction and rate limiting.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::types::{ApiError, AppState};
use crate::config::CLIENT_IP_HEADERS;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_PLAIN_CONTENT_TYPE: &str = "text/plain";

/// Address of the caller: the first non-empty proxy header in priority order
/// (first element of a list), else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    for name in CLIENT_IP_HEADERS {
        let first = headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .unwrap_or_default();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    peer.ip().to_canonical().to_string()
}

/// Rejects requests with a `Content-Type` other than `allowed`.
/// Requests without the header pass.
fn check_content_type(headers: &HeaderMap, allowed: &str) -> Result<(), ApiError> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let raw = String::from_utf8_lossy(value.as_bytes()).to_string();
    let media_type = raw.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case(allowed) {
        Ok(())
    } else {
        Err(ApiError::UnsupportedContentType(raw))
    }
}

pub async fn require_json(request: Request, next: Next) -> Response {
    match check_content_type(request.headers(), JSON_CONTENT_TYPE) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

pub async fn require_text_plain(request: Request, next: Next) -> Response {
    match check_content_type(request.headers(), TEXT_PLAIN_CONTENT_TYPE) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Admits the request through the configured limiter, keyed by client address.
pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(limiter) = &state.limiter {
        let client = client_ip(request.headers(), peer);
        if let Err(e) = limiter.allow(&client).await {
            return ApiError::from(e).into_response();
        }
    }
    next.run(request).await
}
