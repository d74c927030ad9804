//! HTTP client initialization.
//!
//! This module provides the client used to download dataset snapshots.

use std::time::Duration;

use reqwest::ClientBuilder;

use crate::config::SNAPSHOT_DOWNLOAD_TIMEOUT_SECS;
use crate::error_handling::InitializationError;

/// Initializes the HTTP client for snapshot downloads.
///
/// Creates a `reqwest::Client` configured with:
/// - A crate-specific User-Agent header
/// - A whole-request timeout sized for a large monthly file
/// - A short connect timeout so an unreachable mirror fails fast
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` if client creation fails.
pub fn init_client() -> Result<reqwest::Client, InitializationError> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(SNAPSHOT_DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(30))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(InitializationError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_client() {
        assert!(init_client().is_ok());
    }
}
