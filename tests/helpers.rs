// Shared test helpers for database setup and snapshot fixtures.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use sqlx::SqlitePool;
use tempfile::TempDir;

use ip_info::geoip::{LocationRecord, RangeTable};
use ip_info::storage::tables::insert_batch;
use ip_info::{init_db_pool_with_path, run_migrations};

/// Per-call store deadline used by the tests.
#[allow(dead_code)]
pub const DB_TIMEOUT: Duration = Duration::from_secs(5);

/// A three-range snapshot: one IPv4 range per continent plus one IPv6 range.
#[allow(dead_code)]
pub const SNAPSHOT_CSV: &str = "\
1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,-27.4766,153.0166
8.8.8.0,8.8.8.255,NA,US,California,Mountain View,37.386,-122.0838
2001:4860::,2001:4860:ffff:ffff:ffff:ffff:ffff:ffff,NA,US,California,Mountain View,37.4,-122.1
";

/// Creates a file-backed pool with migrations applied.
///
/// The `TempDir` must outlive the pool.
#[allow(dead_code)]
pub async fn create_file_pool() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_db_pool_with_path(&dir.path().join("ip_info.db"))
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    (pool, dir)
}

/// Gzip-compresses `csv` the way snapshots are published.
#[allow(dead_code)]
pub fn gzip(csv: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(csv.as_bytes())
        .expect("Failed to compress snapshot");
    encoder.finish().expect("Failed to finish gzip stream")
}

/// Builds a record covering `start..=end`.
#[allow(dead_code)]
pub fn record(start: &str, end: &str, country: &str, city: &str) -> LocationRecord {
    LocationRecord {
        ip_start: start.parse().expect("valid start address"),
        ip_end: end.parse().expect("valid end address"),
        continent: "EU".to_string(),
        country: country.to_string(),
        state_prov: String::new(),
        city: city.to_string(),
        latitude: 0.0,
        longitude: 0.0,
    }
}

/// Inserts `records` into `table`.
#[allow(dead_code)]
pub async fn seed_table(pool: &SqlitePool, table: RangeTable, records: &[LocationRecord]) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    insert_batch(&mut *conn, table, records)
        .await
        .expect("Failed to seed range table");
}
