//! Range lookup against the active table.
//!
//! The serving table is named by the dataset handle, an atomically swappable
//! pointer to an immutable [`DatasetMetadata`]. Each lookup loads the pointer
//! once, so it reads from exactly one table even while a refresh swaps roles.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error_handling::{DatabaseError, LookupError};
use crate::geoip::address::{address_key, family_floor, parse_ip};
use crate::geoip::{DatasetMetadata, LocationRecord};
use crate::storage::deadline::with_deadline;
use crate::storage::tables::{record_from_row, RECORD_COLUMNS};

/// Process-wide pointer to the current bookkeeping record.
pub type DatasetHandle = Arc<ArcSwap<DatasetMetadata>>;

/// Creates a dataset handle initialized to `metadata`.
pub fn new_dataset_handle(metadata: DatasetMetadata) -> DatasetHandle {
    Arc::new(ArcSwap::from_pointee(metadata))
}

/// Anything that can answer "which range contains this address".
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// The range covering `ip`, or `NotCovered`.
    async fn lookup(&self, ip: IpAddr) -> Result<LocationRecord, LookupError>;
}

/// Looks up ranges in the SQLite table the dataset handle names as active.
#[derive(Clone)]
pub struct RangeLookup {
    pool: SqlitePool,
    dataset: DatasetHandle,
    deadline: Duration,
}

impl RangeLookup {
    /// Creates a lookup reading the table named by `dataset`, each query under `deadline`.
    pub fn new(pool: SqlitePool, dataset: DatasetHandle, deadline: Duration) -> Self {
        Self {
            pool,
            dataset,
            deadline,
        }
    }

    /// Parses `input` and looks it up. Malformed input never reaches the store.
    pub async fn lookup_str(&self, input: &str) -> Result<LocationRecord, LookupError> {
        let ip = parse_ip(input)?;
        self.lookup(ip).await
    }
}

#[async_trait]
impl LocationSource for RangeLookup {
    /// Returns the range with the greatest start address not above `ip`,
    /// within the address family of `ip`.
    async fn lookup(&self, ip: IpAddr) -> Result<LocationRecord, LookupError> {
        let ip = ip.to_canonical();
        let active = self.dataset.load().active_table;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} \
             WHERE ip_start_key <= ? AND ip_start_key >= ? \
             ORDER BY ip_start_key DESC LIMIT 1",
            active.name()
        );
        let row = with_deadline(
            self.deadline,
            sqlx::query(&sql)
                .bind(address_key(ip))
                .bind(family_floor(ip))
                .fetch_optional(&self.pool),
        )
        .await?
        .ok_or(LookupError::NotCovered(ip))?;

        record_from_row(&row).map_err(|e| LookupError::StoreUnavailable(DatabaseError::from(e)))
    }
}
