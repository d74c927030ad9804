//! Background refresh scheduling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{FIRST_UPDATE_DELAY, RETRY_INTERVAL_ON_ERROR};
use crate::error_handling::RefreshError;
use crate::geoip::refresh::RefreshOutcome;

/// Something that can run one refresh cycle.
#[async_trait]
pub trait DatasetUpdate: Send + Sync {
    /// Runs one cycle, stopping at the next step boundary once `cancel` fires.
    async fn update_dataset(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome, RefreshError>;
}

/// Single loop deciding when to run refresh cycles.
///
/// Fires shortly after start. A cycle that succeeds (updated or already up to
/// date) re-arms the timer for the next monthly refresh; any error re-arms it
/// for the fixed retry interval.
pub struct UpdateScheduler {
    updater: Arc<dyn DatasetUpdate>,
    first_delay: Duration,
    retry_interval: Duration,
}

impl UpdateScheduler {
    /// Scheduler with the default first-fire delay and retry interval.
    pub fn new(updater: Arc<dyn DatasetUpdate>) -> Self {
        Self {
            updater,
            first_delay: FIRST_UPDATE_DELAY,
            retry_interval: RETRY_INTERVAL_ON_ERROR,
        }
    }

    /// Overrides the first-fire delay and the retry interval.
    pub fn with_intervals(mut self, first_delay: Duration, retry_interval: Duration) -> Self {
        self.first_delay = first_delay;
        self.retry_interval = retry_interval;
        self
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut delay = self.first_delay;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Update scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = match self.updater.update_dataset(&cancel).await {
                Ok(outcome) => {
                    // Overdue refreshes run right away
                    let next = outcome.next_update().to_std().unwrap_or(Duration::ZERO);
                    info!(
                        "Dataset update completed, next update in {:.1}h",
                        next.as_secs_f64() / 3600.0
                    );
                    next
                }
                Err(RefreshError::LockContention) => {
                    info!(
                        "Dataset update skipped, another instance holds the lock; retry after {:.1}s",
                        self.retry_interval.as_secs_f64()
                    );
                    self.retry_interval
                }
                Err(e) => {
                    warn!(
                        "Dataset update interrupted: {e}; retry after {:.1}s",
                        self.retry_interval.as_secs_f64()
                    );
                    self.retry_interval
                }
            };
        }
    }

    /// Spawns [`run`](Self::run) onto the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
