//! Service resource initialization.
//!
//! This module contains the `init_service_resources` function which handles
//! all setup before the HTTP server starts accepting requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, CACHE_EXPIRATION_CHECK_INTERVAL, LIMITER_CLEANUP_INTERVAL};
use crate::error_handling::MetadataError;
use crate::geoip::{
    new_dataset_handle, DatasetMetadata, DatasetUpdater, RangeLookup, SnapshotSource,
    UpdateScheduler,
};
use crate::initialization::init_client;
use crate::locator::{IpLocator, MemoryCache};
use crate::rate_limiter::{RateLimiter, SlidingWindowLimiter};
use crate::server::AppState;
use crate::storage::{init_db_pool_with_path, run_migrations, MetadataStore};

use super::resources::ServiceResources;

/// Initialize all resources needed to serve requests.
///
/// This function performs the following initialization steps:
/// 1. Validate configuration
/// 2. Initialize the database pool and run migrations
/// 3. Load the dataset metadata into the shared handle
/// 4. Start the refresh scheduler
/// 5. Build the locator with its optional cache
/// 6. Build the optional per-client rate limiter
///
/// Background tasks stop when `cancel` fires.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the database, its
/// schema or the HTTP client cannot be set up.
pub async fn init_service_resources(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<ServiceResources> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let pool = init_db_pool_with_path(&config.db_path)
        .await
        .context("Failed to initialize database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let metadata = load_initial_metadata(&pool, config.db_timeout()).await;
    info!(
        "Serving table {} (last update {})",
        metadata.active_table, metadata.last_update
    );
    let dataset = new_dataset_handle(metadata);

    let client = init_client().context("Failed to initialize HTTP client")?;
    let source = SnapshotSource::new(client, config.snapshot_url.clone());
    let updater = DatasetUpdater::new(pool.clone(), dataset.clone(), source, config.db_timeout());
    let scheduler = UpdateScheduler::new(Arc::new(updater)).spawn(cancel.clone());

    let mut janitors = Vec::new();

    let lookup = RangeLookup::new(pool.clone(), dataset, config.db_timeout());
    let mut locator = IpLocator::new(Arc::new(lookup));
    if config.disable_cache {
        info!("Location cache disabled");
    } else {
        let cache = MemoryCache::new();
        janitors.push(cache.start_janitor(CACHE_EXPIRATION_CHECK_INTERVAL, cancel.clone()));
        locator = locator.with_cache(Arc::new(cache), config.cache_ttl());
    }

    let limiter: Option<Arc<dyn RateLimiter>> = if config.enable_limiter {
        info!("Rate limiter enabled: {} requests/second per client", config.rate_limit);
        let limiter = SlidingWindowLimiter::new(config.rate_limit, config.rate_limit_ttl());
        janitors.push(limiter.start_janitor(LIMITER_CLEANUP_INTERVAL, cancel.clone()));
        Some(Arc::new(limiter))
    } else {
        None
    };

    let state = AppState {
        locator: Arc::new(locator),
        limiter,
        version: env!("CARGO_PKG_VERSION"),
    };

    Ok(ServiceResources {
        pool,
        state,
        scheduler,
        janitors,
    })
}

/// Reads the persisted metadata, falling back to the seeded default.
///
/// The scheduler reloads the record on every cycle, so a failure here only
/// affects which table is served until the first refresh attempt.
async fn load_initial_metadata(pool: &SqlitePool, deadline: Duration) -> DatasetMetadata {
    match MetadataStore::new(pool.clone(), deadline).load().await {
        Ok(metadata) => metadata,
        Err(MetadataError::NotFound) => {
            warn!("No dataset metadata found, starting from the default state");
            DatasetMetadata::default()
        }
        Err(e) => {
            warn!("Failed to load dataset metadata, starting from the default state: {}", e);
            DatasetMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::create_test_pool;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_initial_metadata_reads_store() {
        let pool = create_test_pool().await;
        let saved = DatasetMetadata::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            crate::geoip::RangeTable::Two,
        );
        MetadataStore::new(pool.clone(), Duration::from_secs(5))
            .save(&saved)
            .await
            .unwrap();

        let loaded = load_initial_metadata(&pool, Duration::from_secs(5)).await;
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_initial_metadata_falls_back_to_default() {
        let pool = create_test_pool().await;
        sqlx::query("DELETE FROM dataset_metadata")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(
            load_initial_metadata(&pool, Duration::from_secs(5)).await,
            DatasetMetadata::default()
        );

        pool.close().await;
        assert_eq!(
            load_initial_metadata(&pool, Duration::from_secs(5)).await,
            DatasetMetadata::default()
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_setup() {
        let config = Config {
            db_timeout_ms: 0,
            ..Config::default()
        };
        let result = init_service_resources(&config, &CancellationToken::new()).await;
        let err = result.err().expect("invalid config must fail");
        assert!(format!("{:#}", err).contains("database timeout"));
    }
}
