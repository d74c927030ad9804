//! Database operations: pool, schema, refresh lock, bookkeeping and range tables.

pub(crate) mod deadline;
pub mod lock;
pub mod metadata;
pub mod migrations;
pub mod pool;
pub mod tables;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used items
pub use lock::{classify, AcquireOutcome, LockManager, LockState, LockStatus};
pub use metadata::MetadataStore;
pub use migrations::run_migrations;
pub use pool::init_db_pool_with_path;
