//! Configuration constants.
//!
//! This module defines the constants used throughout the service, including
//! refresh timing, lock timeouts, storage limits and front-end defaults.

use std::time::Duration;

/// Default SQLite database file.
pub const DB_PATH: &str = "./ip_info.db";

// Physical range tables
/// First of the two interchangeable range tables.
pub const TABLE_ONE: &str = "ip_to_city_one";
/// Second of the two interchangeable range tables.
pub const TABLE_TWO: &str = "ip_to_city_two";
/// Name of the marker table whose existence means a refresh holds the lock.
pub const LOCK_TABLE: &str = "_lock";

// Refresh pipeline timing
/// Age after which a lock marker is presumed abandoned and may be reclaimed.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Deadline for the import and index build of one refresh cycle.
/// Equal to the lock timeout so a live import never outlives its lock.
pub const INGESTION_TIMEOUT: Duration = LOCK_TIMEOUT;
/// Default per-call deadline for store operations, in milliseconds.
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 5000;
/// Delay before the scheduler's first refresh attempt.
pub const FIRST_UPDATE_DELAY: Duration = Duration::from_secs(1);
/// Delay before retrying a failed refresh cycle.
pub const RETRY_INTERVAL_ON_ERROR: Duration = Duration::from_secs(60);

// Snapshot source
/// Default snapshot URL template. `{year}` is the four-digit UTC year and
/// `{month}` the zero-padded UTC month.
pub const DEFAULT_SNAPSHOT_URL: &str =
    "https://download.db-ip.com/free/dbip-city-lite-{year}-{month}.csv.gz";
/// Rows per insert statement during the bulk import
pub const IMPORT_BATCH_SIZE: usize = 1000;
/// Batches buffered between the CSV parser thread and the inserter
pub const IMPORT_CHANNEL_CAPACITY: usize = 4;
/// Timeout for the whole snapshot download (large monthly file)
pub const SNAPSHOT_DOWNLOAD_TIMEOUT_SECS: u64 = 15 * 60;
/// Maximum download attempts (initial attempt included)
pub const MAX_SNAPSHOT_DOWNLOAD_ATTEMPTS: usize = 3;
/// Initial delay in milliseconds before retrying a failed download
pub const RETRY_INITIAL_DELAY_MS: u64 = 2000;
/// Factor by which the download retry delay grows on each attempt
pub const RETRY_FACTOR: u64 = 2;
/// Maximum delay between download retries in seconds
pub const RETRY_MAX_DELAY_SECS: u64 = 30;

// Front end defaults
/// Default HTTP listening port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
/// Default admissions per second per client when the limiter is enabled
pub const DEFAULT_RATE_LIMIT: u32 = 10;
/// Seconds an idle client's limiter state is kept
pub const DEFAULT_RATE_LIMIT_TTL_SECS: u64 = 60;
/// Seconds a cached location stays valid
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
/// How often the in-memory cache evicts expired entries
pub const CACHE_EXPIRATION_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// How often the rate limiter evicts idle clients
pub const LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

// HTTP headers consulted for the caller's address, in priority order
/// Set by nginx-style proxies
pub const HEADER_X_REAL_IP: &str = "x-real-ip";
/// Comma-separated proxy chain, client first
pub const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Set by Cloudflare
pub const HEADER_CF_CONNECTING_IP: &str = "cf-connecting-ip";
/// Headers checked by `/client-ip` and the limiter, highest priority first
pub const CLIENT_IP_HEADERS: &[&str] = &[
    HEADER_X_REAL_IP,
    HEADER_X_FORWARDED_FOR,
    HEADER_CF_CONNECTING_IP,
];
