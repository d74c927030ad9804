//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (timeouts, table names, defaults)
//! - CLI option types and parsing
//! - The library `Config` struct and its validation

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, LogFormat, LogLevel, Opt};
