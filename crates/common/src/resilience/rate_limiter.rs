//! Minimum-spacing rate limiter
//!
//! [`IntervalLimiter`] models a single token with a fixed refill interval:
//! no two attempts passing through the same limiter start closer together
//! than `min_interval`. There is no burst capacity.
//!
//! The last-start timestamp is guarded by an async mutex that stays held
//! while the caller waits, so concurrent callers queue up and are released
//! one interval apart. The wait is a `tokio::time` sleep; dropping a pending
//! `throttle()` releases the lock without consuming a slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Serialises attempt start times to a minimum spacing
#[derive(Debug)]
pub struct IntervalLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
    delayed: AtomicU64,
}

impl IntervalLimiter {
    /// A zero interval produces a limiter that never waits.
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_start: Mutex::new(None), delayed: AtomicU64::new(0) }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of `throttle()` calls that had to wait
    pub fn delayed_count(&self) -> u64 {
        self.delayed.load(Ordering::Relaxed)
    }

    /// Wait until `min_interval` has passed since the previous start, then
    /// record a new start. Returns how long the caller waited.
    pub async fn throttle(&self) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }

        let mut last_start = self.last_start.lock().await;
        let arrived = Instant::now();
        let mut waited = Duration::ZERO;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > arrived {
                waited = ready_at - arrived;
                debug!(wait_ms = waited.as_millis() as u64, "Rate limiting, delaying attempt");
                self.delayed.fetch_add(1, Ordering::Relaxed);
                sleep_until(ready_at).await;
            }
        }

        *last_start = Some(Instant::now());
        waited
    }
}
