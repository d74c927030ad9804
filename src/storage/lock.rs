//! Cooperative refresh lock.
//!
//! The lock is the existence of the `_lock` marker table in the shared store.
//! Its single row records when the lock was taken (milliseconds since the
//! epoch). A marker older than the lock timeout is presumed abandoned by a
//! crashed refresh and may be reclaimed.
//!
//! Creation is one `CREATE TABLE ... AS SELECT` statement without
//! `IF NOT EXISTS`, so concurrent creators race on a single DDL statement and
//! exactly one wins. Reclaiming a stale marker is a compare-and-set on the
//! observed timestamp, so two reclaimers cannot both succeed. A marker left
//! without a row or with a `NULL` stamp counts as stale.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use sqlx::SqlitePool;

use crate::config::LOCK_TABLE;
use crate::error_handling::DatabaseError;
use crate::storage::deadline::with_deadline;

/// What the store says about the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No marker table.
    Unlocked,
    /// Marker present, taken at `since`.
    Locked {
        /// When the marker was created or last reclaimed.
        since: DateTime<Utc>,
    },
}

/// Liveness of a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Held for `age`, within the timeout.
    Active(TimeDelta),
    /// Held longer than the timeout; reclaimable.
    Stale,
}

/// Result of an acquisition attempt that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This caller now holds the lock.
    Acquired,
    /// A live lock belongs to someone else, or another reclaimer won.
    AlreadyHeld,
}

/// Classifies a lock taken at `since` as seen at `now`.
///
/// A lock is stale once `now - since` exceeds `timeout`. A `since` in the
/// future (clock skew between replicas) counts as active.
pub fn classify(since: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> LockStatus {
    let age = now.signed_duration_since(since);
    let limit = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
    if age > limit {
        LockStatus::Stale
    } else {
        LockStatus::Active(age)
    }
}

/// Manages the marker table.
#[derive(Clone)]
pub struct LockManager {
    pool: SqlitePool,
    timeout: Duration,
    deadline: Duration,
}

impl LockManager {
    /// Creates a manager treating markers older than `timeout` as stale.
    /// Each store call runs under `deadline`.
    pub fn new(pool: SqlitePool, timeout: Duration, deadline: Duration) -> Self {
        Self {
            pool,
            timeout,
            deadline,
        }
    }

    /// Reads the marker.
    ///
    /// A marker with no row or a `NULL` stamp reads as locked since the epoch,
    /// which classifies as stale and is reclaimed by the next acquirer.
    pub async fn state(&self) -> Result<LockState, DatabaseError> {
        Ok(match self.read_marker().await? {
            Marker::Absent => LockState::Unlocked,
            marker => LockState::Locked {
                since: marker.since(),
            },
        })
    }

    /// Whether any marker exists, live or stale.
    pub async fn is_held(&self) -> Result<bool, DatabaseError> {
        Ok(self.state().await? != LockState::Unlocked)
    }

    /// Liveness of the lock at `now`, or `None` when nobody holds it.
    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<Option<LockStatus>, DatabaseError> {
        Ok(match self.state().await? {
            LockState::Unlocked => None,
            LockState::Locked { since } => Some(classify(since, now, self.timeout)),
        })
    }

    /// [`status_at`](Self::status_at) the current time.
    pub async fn status(&self) -> Result<Option<LockStatus>, DatabaseError> {
        self.status_at(Utc::now()).await
    }

    /// Takes the lock at `now`: creates the marker when absent, reclaims it
    /// when stale, reports `AlreadyHeld` when live.
    pub async fn acquire_at(&self, now: DateTime<Utc>) -> Result<AcquireOutcome, DatabaseError> {
        let marker = self.read_marker().await?;
        if marker == Marker::Absent {
            return self.create(now).await;
        }

        let since = marker.since();
        match classify(since, now, self.timeout) {
            LockStatus::Active(age) => {
                debug!("Lock held for {}s, not acquiring", age.num_seconds());
                Ok(AcquireOutcome::AlreadyHeld)
            }
            LockStatus::Stale => {
                warn!("Reclaiming stale lock taken at {since}");
                self.reclaim(marker, now).await
            }
        }
    }

    /// [`acquire_at`](Self::acquire_at) the current time.
    pub async fn acquire(&self) -> Result<AcquireOutcome, DatabaseError> {
        self.acquire_at(Utc::now()).await
    }

    /// Drops the marker. Idempotent.
    pub async fn release(&self) -> Result<(), DatabaseError> {
        let sql = format!("DROP TABLE IF EXISTS {LOCK_TABLE}");
        with_deadline(self.deadline, sqlx::query(&sql).execute(&self.pool)).await?;
        info!("Lock released");
        Ok(())
    }

    /// Raw marker contents. With several rows the newest stamp counts.
    async fn read_marker(&self) -> Result<Marker, DatabaseError> {
        let exists: Option<String> = with_deadline(
            self.deadline,
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(LOCK_TABLE)
                .fetch_optional(&self.pool),
        )
        .await?;
        if exists.is_none() {
            return Ok(Marker::Absent);
        }

        let sql = format!("SELECT created_at FROM {LOCK_TABLE} ORDER BY created_at DESC LIMIT 1");
        let created_at = with_deadline(
            self.deadline,
            sqlx::query_scalar::<_, Option<i64>>(&sql).fetch_optional(&self.pool),
        )
        .await;

        match created_at {
            Ok(None) => Ok(Marker::Empty),
            Ok(Some(stamp)) => Ok(Marker::Stamped(stamp)),
            // Released between the two queries
            Err(DatabaseError::SqlError(ref e)) if is_missing_table(e) => Ok(Marker::Absent),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, now: DateTime<Utc>) -> Result<AcquireOutcome, DatabaseError> {
        // DDL takes no bind parameters; the value is an integer we produced.
        let sql = format!(
            "CREATE TABLE {LOCK_TABLE} AS SELECT {} AS created_at",
            now.timestamp_millis()
        );
        match with_deadline(self.deadline, sqlx::query(&sql).execute(&self.pool)).await {
            Ok(_) => {
                info!("Lock acquired");
                Ok(AcquireOutcome::Acquired)
            }
            Err(DatabaseError::SqlError(ref e)) if is_already_exists(e) => {
                debug!("Lost the race to create the lock");
                Ok(AcquireOutcome::AlreadyHeld)
            }
            Err(e) => Err(e),
        }
    }

    /// Compare-and-set from the `observed` marker contents to `now`.
    ///
    /// An empty marker is stamped only while it is still empty; a stamped one
    /// only while it still holds the observed value (`IS` so `NULL` matches).
    async fn reclaim(
        &self,
        observed: Marker,
        now: DateTime<Utc>,
    ) -> Result<AcquireOutcome, DatabaseError> {
        let stamp_now = now.timestamp_millis();
        let result = match observed {
            Marker::Absent => return self.create(now).await,
            Marker::Empty => {
                let sql = format!(
                    "INSERT INTO {LOCK_TABLE} (created_at) \
                     SELECT ? WHERE NOT EXISTS (SELECT 1 FROM {LOCK_TABLE})"
                );
                with_deadline(
                    self.deadline,
                    sqlx::query(&sql).bind(stamp_now).execute(&self.pool),
                )
                .await
            }
            Marker::Stamped(stamp) => {
                let sql = format!("UPDATE {LOCK_TABLE} SET created_at = ? WHERE created_at IS ?");
                with_deadline(
                    self.deadline,
                    sqlx::query(&sql)
                        .bind(stamp_now)
                        .bind(stamp)
                        .execute(&self.pool),
                )
                .await
            }
        };

        match result {
            Ok(done) if done.rows_affected() > 0 => {
                info!("Lock acquired (stale lock reclaimed)");
                Ok(AcquireOutcome::Acquired)
            }
            Ok(_) => Ok(AcquireOutcome::AlreadyHeld),
            Err(DatabaseError::SqlError(ref e)) if is_missing_table(e) => {
                // Released while we looked; compete for a fresh marker.
                self.create(now).await
            }
            Err(e) => Err(e),
        }
    }
}

/// What the marker table holds, as read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Absent,
    /// Table exists without rows.
    Empty,
    Stamped(Option<i64>),
}

impl Marker {
    /// Time the marker was taken. Unreadable stamps map to the epoch.
    fn since(self) -> DateTime<Utc> {
        match self {
            Marker::Stamped(Some(ms)) => {
                DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            }
            _ => DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("already exists"))
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}
