//! Refresh bookkeeping persistence.
//!
//! The `dataset_metadata` table holds a single row (id 1) naming the serving
//! table, the table rebuilt by the next refresh and the time of the last
//! successful refresh.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::error_handling::{DatabaseError, MetadataError};
use crate::geoip::DatasetMetadata;
use crate::storage::deadline::with_deadline;

/// Loads and saves the singleton bookkeeping row.
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
    deadline: Duration,
}

impl MetadataStore {
    /// Creates a store whose calls each run under `deadline`.
    pub fn new(pool: SqlitePool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }

    /// Reads the bookkeeping row.
    ///
    /// # Errors
    ///
    /// - `MetadataError::NotFound` if the row is absent
    /// - `MetadataError::Corrupt` if it names unknown tables or one table twice
    /// - `MetadataError::Store` if the query fails or overruns its deadline
    pub async fn load(&self) -> Result<DatasetMetadata, MetadataError> {
        let row = with_deadline(
            self.deadline,
            sqlx::query(
                "SELECT last_update, active_table, backup_table
                 FROM dataset_metadata WHERE id = 1",
            )
            .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(MetadataError::NotFound)?;

        let last_update: DateTime<Utc> = row
            .try_get("last_update")
            .map_err(|e| MetadataError::Corrupt(e.to_string()))?;
        let active: String = row.try_get("active_table").map_err(DatabaseError::from)?;
        let backup: String = row.try_get("backup_table").map_err(DatabaseError::from)?;

        DatasetMetadata::from_names(last_update, &active, &backup).map_err(MetadataError::Corrupt)
    }

    /// Writes `metadata` as the bookkeeping row, creating it if absent.
    pub async fn save(&self, metadata: &DatasetMetadata) -> Result<(), DatabaseError> {
        with_deadline(
            self.deadline,
            sqlx::query(
                "INSERT INTO dataset_metadata (id, last_update, active_table, backup_table)
                 VALUES (1, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    last_update = excluded.last_update,
                    active_table = excluded.active_table,
                    backup_table = excluded.backup_table",
            )
            .bind(metadata.last_update)
            .bind(metadata.active_table.name())
            .bind(metadata.backup_table.name())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
