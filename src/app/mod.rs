//! Service lifecycle helpers.
//!
//! This module provides the shutdown signal listener and the routine that
//! winds down background tasks once the HTTP server has stopped.

pub mod shutdown;

// Re-export public API
pub use shutdown::{shutdown_gracefully, wait_for_shutdown_signal};
