//! IP range dataset: lookup, refresh and scheduling.
//!
//! The dataset lives in two interchangeable SQLite tables. One serves lookups
//! while the other is rebuilt from the monthly snapshot; a successful refresh
//! swaps their roles. The in-process [`DatasetHandle`] names the serving table.

mod address;
mod lookup;
mod refresh;
mod scheduler;
mod snapshot;
mod types;

// Re-export public API
pub use address::{address_key, family_floor, parse_ip};
pub use lookup::{new_dataset_handle, DatasetHandle, LocationSource, RangeLookup};
pub use refresh::{next_update_delay, DatasetUpdater, RefreshOutcome};
pub use scheduler::{DatasetUpdate, UpdateScheduler};
pub use snapshot::{default_retry_delays, import_snapshot, snapshot_url, SnapshotSource};
pub use types::{DatasetMetadata, IpInfo, LocationRecord, RangeTable, RefreshStage};
