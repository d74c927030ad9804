//! Shared test helpers for storage module tests.
//!
//! This module provides common utilities for database setup and test data creation
//! used across storage, lookup and refresh tests.

#[cfg(test)]
use sqlx::sqlite::SqlitePoolOptions;
#[cfg(test)]
use sqlx::SqlitePool;

#[cfg(test)]
use crate::geoip::LocationRecord;
#[cfg(test)]
use crate::storage::run_migrations;

/// Creates a test database pool with migrations applied.
/// Uses an in-memory database for fast test execution.
///
/// An in-memory database lives as long as its connection, so the pool is
/// pinned to a single connection that is never recycled.
#[cfg(test)]
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Creates a location record for `ip_start..=ip_end` with placeholder place names.
#[cfg(test)]
pub fn sample_record(ip_start: &str, ip_end: &str, country: &str) -> LocationRecord {
    LocationRecord {
        ip_start: ip_start.parse().expect("valid start address"),
        ip_end: ip_end.parse().expect("valid end address"),
        continent: "EU".to_string(),
        country: country.to_string(),
        state_prov: format!("{country} state"),
        city: format!("{country} city"),
        latitude: 48.85,
        longitude: 2.35,
    }
}

/// Inserts `records` into `table` outside any refresh cycle.
#[cfg(test)]
pub async fn seed_table(
    pool: &SqlitePool,
    table: crate::geoip::RangeTable,
    records: &[LocationRecord],
) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    crate::storage::tables::insert_batch(&mut conn, table, records)
        .await
        .expect("Failed to seed range table");
}
