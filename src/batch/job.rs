use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::state::JobState;

/// Terminal result for one job, addressed by the job's original index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    /// The call succeeded. The text may be empty, meaning nothing usable was found.
    Text(String),
    /// Non-fatal per-item failure; contributes nothing to the output.
    Errored,
    /// The job never ran or was abandoned because the batch was stopped.
    Cancelled,
}

/// Read-only settings for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunConfig {
    /// Number of workers. Clamped to `1..=MAX_CONCURRENCY` when the run starts.
    pub concurrency: usize,
    /// Aggregate outbound call budget for the whole pool.
    pub requests_per_minute: u32,
    /// Upper bound (exclusive) of the random extra spacing added after each grant.
    pub jitter_max: Duration,
    /// Retries allowed for network-layer failures before the job fails.
    pub max_transient_retries: u32,
    /// Linear backoff step: the n-th transient retry waits `n * transient_backoff`.
    pub transient_backoff: Duration,
    /// Retries allowed for rate-limit rejections before the whole batch aborts.
    pub max_rate_limit_retries: u32,
    /// Exponential backoff base for rate-limit retries.
    pub rate_limit_backoff: Duration,
    /// Cap on a single rate-limit backoff.
    pub rate_limit_backoff_cap: Duration,
    /// Hard ceiling on one inference call.
    pub per_call_timeout: Duration,
}

impl Default for BatchRunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            requests_per_minute: 30,
            jitter_max: Duration::from_millis(200),
            max_transient_retries: 3,
            transient_backoff: Duration::from_secs(10),
            max_rate_limit_retries: 5,
            rate_limit_backoff: Duration::from_secs(5),
            rate_limit_backoff_cap: Duration::from_secs(60),
            per_call_timeout: Duration::from_secs(120),
        }
    }
}

impl BatchRunConfig {
    pub const MAX_CONCURRENCY: usize = 10;

    /// Worker count actually used.
    pub fn workers(&self) -> usize {
        self.concurrency.clamp(1, Self::MAX_CONCURRENCY)
    }

    /// Minimum spacing between two grants: `60 / (rpm / workers)` seconds.
    ///
    /// The spacing grows with the pool, so adding workers never raises the
    /// aggregate call rate above `requests_per_minute`.
    pub fn min_gap(&self) -> Duration {
        let rpm = self.requests_per_minute.max(1) as f64;
        Duration::from_secs_f64(60.0 / (rpm / self.workers() as f64))
    }

    /// Delay before transient retry number `attempt` (1-based): `base * attempt`.
    pub fn transient_delay(&self, attempt: u32) -> Duration {
        self.transient_backoff.saturating_mul(attempt.max(1))
    }

    /// Delay before rate-limit retry number `attempt` (1-based): `min(cap, base * 2^(attempt-1))`.
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.rate_limit_backoff
            .saturating_mul(factor)
            .min(self.rate_limit_backoff_cap)
    }
}

/// One image to process.
#[derive(Debug, Clone)]
pub struct Job {
    /// Original position in the input list; the only ordering key.
    pub index: usize,
    pub source: PathBuf,
    /// Transient failures seen so far.
    pub attempt_count: u32,
    /// Rate-limit rejections seen so far.
    pub rate_limit_retry_count: u32,
    pub state: JobState,
    pub state_history: Vec<JobState>,
}

impl Job {
    pub fn new(index: usize, source: PathBuf) -> Self {
        Self {
            index,
            source,
            attempt_count: 0,
            rate_limit_retry_count: 0,
            state: JobState::Pending,
            state_history: Vec::new(),
        }
    }

    /// File name used in log lines.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    pub(crate) fn enter(&mut self, next: JobState) {
        self.state_history.push(self.state);
        self.state = next;
    }
}
