//! Sliding window of admission times for one client.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Admission timestamps of one client within the last `window`.
pub(crate) struct AdmissionWindow {
    admissions: VecDeque<Instant>,
    last_seen: Instant,
}

impl AdmissionWindow {
    pub(crate) fn new(now: Instant) -> Self {
        AdmissionWindow {
            admissions: VecDeque::new(),
            last_seen: now,
        }
    }

    /// Admits a request at `now` unless `limit` requests were already admitted
    /// within the trailing `window`. Rejected requests are not recorded.
    pub(crate) fn try_admit(&mut self, now: Instant, limit: usize, window: Duration) -> bool {
        self.last_seen = now;

        // Remove old entries outside the time window
        while let Some(front) = self.admissions.front() {
            if now.duration_since(*front) >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }

        if self.admissions.len() >= limit {
            return false;
        }
        self.admissions.push_back(now);
        true
    }

    /// True when the client has made no request for longer than `ttl`.
    pub(crate) fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_seen) > ttl
    }
}
