//! Error type definitions.
//!
//! This module defines the error types used throughout the service, one enum per
//! concern. Lookup errors keep the three caller-visible outcomes (malformed
//! address, uncovered address, store failure) apart because the front end maps
//! each to a different status code.

use std::net::IpAddr;
use std::time::Duration;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use thiserror::Error;

use crate::geoip::RefreshStage;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Error types for configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A numeric option is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),

    /// The snapshot URL template lacks a placeholder.
    #[error("Snapshot URL template must contain {{year}} and {{month}}: {0}")]
    SnapshotTemplate(String),

    /// The expanded snapshot URL is not an absolute http(s) URL.
    #[error("Snapshot URL template is not a valid http(s) URL: {0}")]
    SnapshotUrl(String),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// The call did not finish before its deadline.
    #[error("Database call timed out after {0:?}")]
    Timeout(Duration),
}

/// Error types for loading the refresh bookkeeping record.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The singleton row does not exist.
    #[error("Dataset metadata not found")]
    NotFound,

    /// The row exists but names unknown tables or violates the active/backup invariant.
    #[error("Dataset metadata is corrupt: {0}")]
    Corrupt(String),

    /// The store could not be reached.
    #[error("Couldn't load dataset metadata: {0}")]
    Store(#[from] DatabaseError),
}

/// Error types for the range lookup path.
#[derive(Error, Debug)]
pub enum LookupError {
    /// The caller supplied something that is not an IPv4 or IPv6 address.
    #[error("Could not parse the IP address: {0}")]
    InvalidAddress(String),

    /// The address is valid but no range in the active table starts at or below it.
    #[error("No ip address in the database: {0}")]
    NotCovered(IpAddr),

    /// The store failed or timed out.
    #[error("Database error: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

/// Error types for cache backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backend could not be reached or rejected the call.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Error types for rate limiter backends.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// The client has used up its admissions for the current window.
    #[error("rate limit exceeded")]
    Exceeded,

    /// The backend could not be reached or rejected the call.
    #[error("Rate limiter unavailable: {0}")]
    Unavailable(String),
}

/// Error types for downloading and importing a snapshot.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The snapshot could not be downloaded.
    #[error("Snapshot download failed: {0}")]
    Download(#[from] ReqwestError),

    /// Local I/O on the downloaded file failed.
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader failed (bad gzip stream, bad quoting, ...).
    #[error("Snapshot CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A row was readable but its contents are invalid.
    #[error("Malformed snapshot row {line}: {reason}")]
    MalformedRow {
        /// 1-based line in the decompressed CSV
        line: u64,
        /// What was wrong with the row
        reason: String,
    },

    /// The snapshot decoded to zero rows; promoting it would empty the dataset.
    #[error("Snapshot contained no rows")]
    EmptySnapshot,

    /// Download plus import, or the index build, overran the ingestion deadline.
    #[error("Snapshot ingestion timed out after {0:?}")]
    TimedOut(Duration),

    /// The parser thread went away unexpectedly.
    #[error("Snapshot parser task failed: {0}")]
    ParserTask(String),

    /// The store rejected a table operation or insert.
    #[error("{0}")]
    Store(#[from] DatabaseError),
}

/// Error types for one refresh cycle.
///
/// `LockContention` is an expected outcome under multi-instance deployment and
/// is logged without alarm; every variant makes the scheduler back off and retry.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// The bookkeeping record could not be loaded; the lock was not touched.
    #[error(transparent)]
    MetadataUnavailable(#[from] MetadataError),

    /// Another instance holds a live lock.
    #[error("Lock already acquired by another instance")]
    LockContention,

    /// The lock could not be inspected or created.
    #[error("Failed to acquire lock: {0}")]
    LockUnavailable(DatabaseError),

    /// A pipeline step failed after the lock was taken.
    #[error("Dataset refresh failed at {stage}: {source}")]
    IngestionFailure {
        /// Step that failed
        stage: RefreshStage,
        /// Underlying failure
        #[source]
        source: IngestionError,
    },

    /// The process is shutting down; the cycle stopped at a step boundary.
    #[error("Dataset refresh cancelled before {0}")]
    Cancelled(RefreshStage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_messages_are_distinct() {
        let invalid = LookupError::InvalidAddress("999.999.999.999".to_string());
        let missing = LookupError::NotCovered("10.0.0.1".parse().unwrap());
        let store = LookupError::StoreUnavailable(DatabaseError::Timeout(Duration::from_secs(5)));

        assert!(invalid.to_string().contains("999.999.999.999"));
        assert!(missing.to_string().contains("10.0.0.1"));
        assert!(store.to_string().contains("timed out"));
    }

    #[test]
    fn test_refresh_error_names_stage() {
        let err = RefreshError::IngestionFailure {
            stage: RefreshStage::BuildIndex,
            source: IngestionError::Store(DatabaseError::Timeout(Duration::from_secs(1))),
        };
        assert!(err.to_string().contains("build index"));
    }

    #[test]
    fn test_metadata_error_is_transparent_in_refresh_error() {
        let err = RefreshError::from(MetadataError::NotFound);
        assert_eq!(err.to_string(), "Dataset metadata not found");
    }

    #[test]
    fn test_config_error_message_mentions_placeholders() {
        let err = ConfigError::SnapshotTemplate("https://example.com".to_string());
        let msg = err.to_string();
        assert!(msg.contains("{year}"));
        assert!(msg.contains("{month}"));
    }
}
