//! Dataset refresh orchestration.
//!
//! One cycle rebuilds the backup table from the current monthly snapshot and
//! then promotes it:
//!
//! 1. load the bookkeeping record and publish it to the dataset handle
//! 2. stop if the dataset was refreshed this UTC month
//! 3. take the cooperative lock
//! 4. truncate the backup table and drop its index
//! 5. download and import the snapshot, rebuild the index
//! 6. swap roles in memory, persist the record
//! 7. release the lock, whatever happened in 4 to 6
//!
//! Readers keep using the active table throughout; they only move to the
//! rebuilt table once it is fully loaded and indexed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, TimeDelta, Utc};
use log::{info, warn};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{INGESTION_TIMEOUT, LOCK_TIMEOUT};
use crate::error_handling::{IngestionError, RefreshError};
use crate::geoip::lookup::DatasetHandle;
use crate::geoip::scheduler::DatasetUpdate;
use crate::geoip::snapshot::{import_snapshot, SnapshotSource};
use crate::geoip::{DatasetMetadata, RefreshStage};
use crate::storage::tables::{create_index, drop_index, truncate};
use crate::storage::{AcquireOutcome, LockManager, MetadataStore};

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The backup table was rebuilt and promoted.
    Updated {
        /// Time until the next refresh is due
        next_update: TimeDelta,
    },
    /// The dataset is already from this month; nothing was touched.
    UpToDate {
        /// Time until the next refresh is due
        next_update: TimeDelta,
    },
}

impl RefreshOutcome {
    /// Time until the next refresh is due. May be negative.
    pub fn next_update(&self) -> TimeDelta {
        match self {
            RefreshOutcome::Updated { next_update } | RefreshOutcome::UpToDate { next_update } => {
                *next_update
            }
        }
    }
}

/// Time from `now` until 23:59:59 UTC on day 1 of the month after `last_update`.
///
/// Negative when that moment has passed.
pub fn next_update_delay(last_update: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    let due = last_update
        .date_naive()
        .with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_month| next_month.and_hms_opt(23, 59, 59))
        .map(|due| due.and_utc());

    match due {
        Some(due) => due.signed_duration_since(now),
        None => TimeDelta::zero(),
    }
}

/// Runs refresh cycles against one store.
pub struct DatasetUpdater {
    pool: SqlitePool,
    dataset: DatasetHandle,
    metadata: MetadataStore,
    lock: LockManager,
    source: SnapshotSource,
    db_timeout: Duration,
    ingestion_timeout: Duration,
}

impl DatasetUpdater {
    /// Creates an updater publishing to `dataset`. Store calls run under
    /// `db_timeout`; download, import and index build under the ingestion timeout.
    pub fn new(
        pool: SqlitePool,
        dataset: DatasetHandle,
        source: SnapshotSource,
        db_timeout: Duration,
    ) -> Self {
        Self {
            metadata: MetadataStore::new(pool.clone(), db_timeout),
            lock: LockManager::new(pool.clone(), LOCK_TIMEOUT, db_timeout),
            pool,
            dataset,
            source,
            db_timeout,
            ingestion_timeout: INGESTION_TIMEOUT,
        }
    }

    /// Overrides the deadline for download, import and index build.
    pub fn with_ingestion_timeout(mut self, timeout: Duration) -> Self {
        self.ingestion_timeout = timeout;
        self
    }

    /// The lock this updater takes.
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// Runs one cycle as of `now`.
    ///
    /// # Errors
    ///
    /// - `MetadataUnavailable` if the record can't be loaded (lock untouched)
    /// - `LockContention` if another instance holds a live lock
    /// - `LockUnavailable` if the lock can't be inspected or created
    /// - `IngestionFailure` if a pipeline step fails (lock released)
    /// - `Cancelled` if `cancel` fires before a step (lock released)
    pub async fn update_dataset_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, RefreshError> {
        info!("Dataset update started");
        let current = self.metadata.load().await?;
        self.dataset.store(Arc::new(current.clone()));

        if current.is_current(now) {
            let next_update = next_update_delay(current.last_update, now);
            info!(
                "Dataset is up to date (last update {}), nothing to do",
                current.last_update
            );
            return Ok(RefreshOutcome::UpToDate { next_update });
        }

        ensure_not_cancelled(cancel, RefreshStage::Acquire)?;
        match self.lock.acquire_at(now).await {
            Ok(AcquireOutcome::Acquired) => {}
            Ok(AcquireOutcome::AlreadyHeld) => return Err(RefreshError::LockContention),
            Err(e) => return Err(RefreshError::LockUnavailable(e)),
        }

        let result = self.rebuild(&current, now, cancel).await;

        if let Err(e) = self.lock.release().await {
            warn!("Failed to release lock: {e}");
        }
        result
    }

    async fn rebuild(
        &self,
        current: &DatasetMetadata,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, RefreshError> {
        let target = current.backup_table;

        ensure_not_cancelled(cancel, RefreshStage::Truncate)?;
        info!("Truncating {target}");
        truncate(&self.pool, target, self.db_timeout)
            .await
            .map_err(failed_at(RefreshStage::Truncate))?;

        ensure_not_cancelled(cancel, RefreshStage::DropIndex)?;
        drop_index(&self.pool, target, self.db_timeout)
            .await
            .map_err(failed_at(RefreshStage::DropIndex))?;

        ensure_not_cancelled(cancel, RefreshStage::Import)?;
        let url = self.source.url_for(now);
        info!("Importing snapshot {url} into {target}");
        let import = async {
            let file = self.source.download(&url).await?;
            import_snapshot(&self.pool, target, file).await
        };
        let rows = tokio::select! {
            _ = cancel.cancelled() => return Err(RefreshError::Cancelled(RefreshStage::Import)),
            result = self.within_ingestion_deadline(import) => {
                result.map_err(failed_at(RefreshStage::Import))?
            }
        };

        ensure_not_cancelled(cancel, RefreshStage::BuildIndex)?;
        info!("Building index on {target} ({rows} rows)");
        self.within_ingestion_deadline(async {
            create_index(&self.pool, target, self.ingestion_timeout)
                .await
                .map_err(IngestionError::from)
        })
        .await
        .map_err(failed_at(RefreshStage::BuildIndex))?;

        ensure_not_cancelled(cancel, RefreshStage::Swap)?;
        let next = current.swapped(now);
        self.dataset.store(Arc::new(next.clone()));
        info!("Active table is now {}", next.active_table);

        if let Err(e) = self.metadata.save(&next).await {
            warn!("Failed to persist dataset metadata, serving from memory until the next cycle: {e}");
        }

        Ok(RefreshOutcome::Updated {
            next_update: next_update_delay(next.last_update, now),
        })
    }

    async fn within_ingestion_deadline<T, F>(&self, work: F) -> Result<T, IngestionError>
    where
        F: Future<Output = Result<T, IngestionError>>,
    {
        match tokio::time::timeout(self.ingestion_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(IngestionError::TimedOut(self.ingestion_timeout)),
        }
    }
}

#[async_trait]
impl DatasetUpdate for DatasetUpdater {
    async fn update_dataset(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, RefreshError> {
        self.update_dataset_at(Utc::now(), cancel).await
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, stage: RefreshStage) -> Result<(), RefreshError> {
    if cancel.is_cancelled() {
        return Err(RefreshError::Cancelled(stage));
    }
    Ok(())
}

fn failed_at<E>(stage: RefreshStage) -> impl FnOnce(E) -> RefreshError
where
    E: Into<IngestionError>,
{
    move |e| RefreshError::IngestionFailure {
        stage,
        source: e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::{new_dataset_handle, RangeTable};
    use crate::storage::test_helpers::{create_test_pool, sample_record, seed_table};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn updater(pool: &SqlitePool, handle: DatasetHandle) -> DatasetUpdater {
        // Nothing listens here; any download attempt fails fast.
        let source = SnapshotSource::new(reqwest::Client::new(), "http://127.0.0.1:9/{year}-{month}.csv.gz")
            .with_retry_delays(Vec::new());
        DatasetUpdater::new(pool.clone(), handle, source, Duration::from_secs(5))
    }

    #[test]
    fn test_next_update_delay_mid_month() {
        let last = utc(2024, 3, 5, 10, 0, 0);
        let due = utc(2024, 4, 1, 23, 59, 59);
        assert_eq!(next_update_delay(last, last), due - last);
    }

    #[test]
    fn test_next_update_delay_december_rolls_year() {
        let last = utc(2024, 12, 31, 23, 0, 0);
        let due = utc(2025, 1, 1, 23, 59, 59);
        assert_eq!(next_update_delay(last, last), due - last);
    }

    #[test]
    fn test_next_update_delay_negative_when_overdue() {
        let last = utc(2024, 1, 15, 0, 0, 0);
        let now = utc(2024, 3, 1, 0, 0, 0);
        assert!(next_update_delay(last, now) < TimeDelta::zero());
    }

    #[test]
    fn test_refresh_outcome_next_update() {
        let d = TimeDelta::hours(3);
        assert_eq!(RefreshOutcome::Updated { next_update: d }.next_update(), d);
        assert_eq!(RefreshOutcome::UpToDate { next_update: d }.next_update(), d);
    }

    #[tokio::test]
    async fn test_up_to_date_touches_nothing() {
        let pool = create_test_pool().await;
        let now = utc(2024, 6, 20, 12, 0, 0);
        let stored = DatasetMetadata::new(utc(2024, 6, 2, 0, 0, 0), RangeTable::Two);
        MetadataStore::new(pool.clone(), Duration::from_secs(5))
            .save(&stored)
            .await
            .unwrap();
        seed_table(&pool, RangeTable::One, &[sample_record("1.0.0.0", "1.0.0.255", "AU")]).await;

        let handle = new_dataset_handle(DatasetMetadata::default());
        let updater = updater(&pool, handle.clone());
        let outcome = updater
            .update_dataset_at(now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::UpToDate {
                next_update: utc(2024, 7, 1, 23, 59, 59) - now
            }
        );
        // Loaded record is published
        assert_eq!(**handle.load(), stored);
        assert!(!updater.lock_manager().is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_metadata_leaves_lock_untouched() {
        let pool = create_test_pool().await;
        sqlx::query("DELETE FROM dataset_metadata")
            .execute(&pool)
            .await
            .unwrap();

        let updater = updater(&pool, new_dataset_handle(DatasetMetadata::default()));
        let result = updater
            .update_dataset_at(utc(2024, 6, 1, 0, 0, 0), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RefreshError::MetadataUnavailable(_))));
        assert!(!updater.lock_manager().is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_live_lock_is_contention() {
        let pool = create_test_pool().await;
        let now = utc(2024, 6, 1, 12, 0, 0);
        let updater = updater(&pool, new_dataset_handle(DatasetMetadata::default()));
        updater
            .lock_manager()
            .acquire_at(now - TimeDelta::minutes(5))
            .await
            .unwrap();

        let result = updater.update_dataset_at(now, &CancellationToken::new()).await;
        assert!(matches!(result, Err(RefreshError::LockContention)));
        // The other holder's lock survives
        assert!(updater.lock_manager().is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_import_releases_lock_and_keeps_serving() {
        let pool = create_test_pool().await;
        seed_table(&pool, RangeTable::One, &[sample_record("1.0.0.0", "1.0.0.255", "AU")]).await;
        seed_table(&pool, RangeTable::Two, &[sample_record("1.0.0.0", "1.0.0.255", "NZ")]).await;

        let handle = new_dataset_handle(DatasetMetadata::default());
        let updater = updater(&pool, handle.clone());
        let result = updater
            .update_dataset_at(utc(2024, 6, 1, 12, 0, 0), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RefreshError::IngestionFailure {
                stage: RefreshStage::Import,
                source: IngestionError::Download(_)
            })
        ));
        assert!(!updater.lock_manager().is_held().await.unwrap());
        assert_eq!(handle.load().active_table, RangeTable::One);

        let stored = MetadataStore::new(pool.clone(), Duration::from_secs(5))
            .load()
            .await
            .unwrap();
        assert_eq!(stored, DatasetMetadata::default());
    }

    #[tokio::test]
    async fn test_cancelled_cycle_releases_lock() {
        let pool = create_test_pool().await;
        let updater = updater(&pool, new_dataset_handle(DatasetMetadata::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = updater
            .update_dataset_at(utc(2024, 6, 1, 12, 0, 0), &cancel)
            .await;
        assert!(matches!(
            result,
            Err(RefreshError::Cancelled(RefreshStage::Acquire))
        ));
        assert!(!updater.lock_manager().is_held().await.unwrap());
    }
}
