//! In-memory per-client limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;

use super::window::AdmissionWindow;
use super::RateLimiter;
use crate::error_handling::RateLimitError;

/// Length of the admission window; `rate` is per this period.
const WINDOW: Duration = Duration::from_secs(1);

/// Admits at most `rate` requests per second per client key.
///
/// State for a client idle longer than `ttl` is dropped by the janitor
/// started with [`start_janitor`](Self::start_janitor).
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    clients: Arc<Mutex<HashMap<String, AdmissionWindow>>>,
    rate: usize,
    ttl: Duration,
}

impl SlidingWindowLimiter {
    /// Admits `rate` requests per second per client; forgets clients idle for `ttl`.
    pub fn new(rate: u32, ttl: Duration) -> Self {
        SlidingWindowLimiter {
            clients: Arc::new(Mutex::new(HashMap::new())),
            rate: rate as usize,
            ttl,
        }
    }

    /// Number of clients with tracked state.
    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Drops state of clients idle longer than the TTL; returns how many.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, window| !window.is_idle(now, self.ttl));
        before - clients.len()
    }

    /// Evicts idle clients every `every` until `shutdown` fires.
    pub fn start_janitor(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let limiter = self.clone();
        let mut ticker = interval(every);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle().await;
                        if evicted > 0 {
                            log::debug!("Rate limiter evicted {evicted} idle clients");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        log::debug!("Rate limiter janitor shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, client: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let window = clients
            .entry(client.to_string())
            .or_insert_with(|| AdmissionWindow::new(now));

        if window.try_admit(now, self.rate, WINDOW) {
            Ok(())
        } else {
            Err(RateLimitError::Exceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limits_each_client_separately() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.allow("1.1.1.1").await.is_ok());
        assert!(limiter.allow("1.1.1.1").await.is_ok());
        assert!(matches!(
            limiter.allow("1.1.1.1").await,
            Err(RateLimitError::Exceeded)
        ));
        assert!(limiter.allow("2.2.2.2").await.is_ok());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("1.1.1.1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_idle_clients() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(60));
        limiter.allow("1.1.1.1").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.allow("2.2.2.2").await.unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.evict_idle().await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_runs_until_cancelled() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(5));
        limiter.allow("1.1.1.1").await.unwrap();

        let shutdown = CancellationToken::new();
        let janitor = limiter.start_janitor(Duration::from_secs(10), shutdown.clone());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(limiter.tracked_clients().await, 0);

        shutdown.cancel();
        janitor.await.unwrap();
    }
}
