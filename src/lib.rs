//! ip_info library: IP address geolocation service
//!
//! This library resolves IPv4 and IPv6 addresses to a continent, country,
//! region, city and coordinates. Locations come from a range dataset kept in
//! SQLite and refreshed monthly from a public CSV snapshot. Two range tables
//! alternate roles, so lookups keep reading the active table while the other
//! one is rebuilt, and a table-based lock keeps several instances sharing one
//! database from refreshing at the same time.
//!
//! # Example
//!
//! ```no_run
//! use ip_info::{run_service, Config};
//! use tokio;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     db_path: std::path::PathBuf::from("ip_info.db"),
//!     http_port: 8080,
//!     enable_limiter: true,
//!     ..Default::default()
//! };
//!
//! run_service(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

mod app;
pub mod config;
pub mod error_handling;
pub mod geoip;
pub mod initialization;
pub mod locator;
pub mod rate_limiter;
mod run;
pub mod server;
pub mod storage;

// Re-export public API
pub use config::{Config, LogFormat, LogLevel, Opt};
pub use geoip::{
    next_update_delay, DatasetMetadata, DatasetUpdater, IpInfo, LocationRecord, RangeLookup,
    RangeTable, RefreshOutcome, SnapshotSource,
};
pub use locator::IpLocator;
pub use run::{run_service, serve_with};
pub use storage::{init_db_pool_with_path, run_migrations, LockManager, MetadataStore};
