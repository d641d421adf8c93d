use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Process-wide spacing throttle shared by every worker of a batch.
///
/// Consecutive grants are at least `min_gap` apart. After each grant a random
/// jitter in `[0, jitter_max)` is added to the next baseline so workers do not
/// line up; jitter only ever lengthens the spacing.
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    jitter_max: Duration,
    /// Baseline the next grant is measured from. `None` until the first grant.
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration, jitter_max: Duration) -> Self {
        Self {
            min_gap,
            jitter_max,
            last_grant: Mutex::new(None),
        }
    }

    /// Wait until the caller may issue its next outbound call.
    ///
    /// The slot is reserved under the lock and the wait happens after the lock
    /// is released, so other workers can queue their own reservations in the
    /// meantime. Returns the grant time, or `None` if `cancel` fired first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<Instant> {
        let reserved_at = Instant::now();
        let deadline = {
            let mut last = self.last_grant.lock().await;
            let now = Instant::now();
            let deadline = match *last {
                Some(prev) => (prev + self.min_gap).max(now),
                None => now,
            };
            *last = Some(deadline + self.jitter());
            deadline
        };

        if deadline > Instant::now() {
            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = cancel.cancelled() => return None,
            }
        }
        tracing::trace!(
            wait_ms = deadline.saturating_duration_since(reserved_at).as_millis() as u64,
            "rate limiter grant"
        );
        Some(deadline)
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max.is_zero() {
            return Duration::ZERO;
        }
        let max = self.jitter_max.as_secs_f64();
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..max))
    }
}
