//! Resolve an address string to a location.
//!
//! Cache-aside over a [`LocationSource`]: the cache is consulted first and
//! filled after a store hit. The cache only ever speeds things up; its
//! failures are logged and otherwise ignored.

mod cache;

pub use cache::{IpCache, MemoryCache};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::error_handling::LookupError;
use crate::geoip::{parse_ip, IpInfo, LocationSource};

/// Resolves caller input to an [`IpInfo`].
#[derive(Clone)]
pub struct IpLocator {
    source: Arc<dyn LocationSource>,
    cache: Option<Arc<dyn IpCache>>,
    cache_ttl: Duration,
}

impl IpLocator {
    /// Creates a locator without a cache.
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self {
            source,
            cache: None,
            cache_ttl: Duration::ZERO,
        }
    }

    /// Adds a cache whose entries live for `ttl`.
    pub fn with_cache(mut self, cache: Arc<dyn IpCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Resolves `input`.
    ///
    /// # Errors
    ///
    /// - `LookupError::InvalidAddress` if `input` is not an address
    /// - `LookupError::NotCovered` if no range covers it
    /// - `LookupError::StoreUnavailable` if the store failed
    pub async fn resolve(&self, input: &str) -> Result<IpInfo, LookupError> {
        let ip = parse_ip(input)?;
        let key = ip.to_string();

        if let Some(info) = self.cached(&key).await {
            return Ok(info);
        }

        let record = self.source.lookup(ip).await?;
        let info = IpInfo::from_record(ip, record);
        self.remember(&key, &info).await;
        Ok(info)
    }

    async fn cached(&self, key: &str) -> Option<IpInfo> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!("Ignoring undecodable cache entry for {key}: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Cache read failed for {key}: {e}");
                None
            }
        }
    }

    async fn remember(&self, key: &str, info: &IpInfo) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(info) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode cache entry for {key}: {e}");
                return;
            }
        };
        if let Err(e) = cache.set(key, bytes, self.cache_ttl).await {
            warn!("Failed to cache location for {key}: {e}");
        }
    }
}
