//! Per-client request rate limiting for the front end.
//!
//! Backends implement [`RateLimiter`]. The in-memory backend keeps a sliding
//! window of admission times per client key and forgets clients that have
//! been idle longer than its TTL.

mod limiter;
mod window;

pub use limiter::SlidingWindowLimiter;

use async_trait::async_trait;

use crate::error_handling::RateLimitError;

/// Admission control keyed by client (usually the caller's address).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// `Ok` to proceed, `RateLimitError::Exceeded` to reject.
    async fn allow(&self, client: &str) -> Result<(), RateLimitError>;
}
