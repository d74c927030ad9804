//! Error handling.
//!
//! This module provides the error type definitions for every concern of the
//! service: initialization, configuration, storage, lookups, snapshot ingestion
//! and refresh cycles.
//!
//! Lookup errors are returned to the immediate caller and never retried here.
//! Refresh errors are absorbed by the scheduler, which backs off and retries.

mod types;

// Re-export public API
pub use types::{
    CacheError, ConfigError, DatabaseError, IngestionError, InitializationError, LookupError,
    MetadataError, RateLimitError, RefreshError,
};
