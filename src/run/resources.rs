//! Service resources.
//!
//! This module defines the `ServiceResources` struct which holds everything
//! the service needs while it runs.

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use crate::server::AppState;

/// All resources initialized for a running service.
pub struct ServiceResources {
    /// Database connection pool
    pub pool: SqlitePool,
    /// Router state (locator, optional limiter, version)
    pub state: AppState,
    /// The refresh scheduler task
    pub scheduler: JoinHandle<()>,
    /// Cache and limiter eviction tasks
    pub janitors: Vec<JoinHandle<()>>,
}
