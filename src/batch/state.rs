use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::classify::RetryDecision;
use super::job::{BatchOutcome, BatchRunConfig, Job};

/// Lifecycle of a single job.
///
/// `Pending → InFlight → {TransientBackoff, RateLimitBackoff, Success, ItemFailure, Cancelled}`;
/// both backoff states lead back to `InFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    InFlight,
    TransientBackoff,
    RateLimitBackoff,
    Success,
    ItemFailure,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::ItemFailure | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::InFlight => write!(f, "IN_FLIGHT"),
            JobState::TransientBackoff => write!(f, "TRANSIENT_BACKOFF"),
            JobState::RateLimitBackoff => write!(f, "RATE_LIMIT_BACKOFF"),
            JobState::Success => write!(f, "SUCCESS"),
            JobState::ItemFailure => write!(f, "ITEM_FAILURE"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// What happens after a failed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Sleep for `delay`, then go back to `InFlight`.
    Backoff { state: JobState, delay: Duration },
    /// The job is finished with this outcome.
    Finish(BatchOutcome),
    /// Rate-limit retries are exhausted: stop the whole batch.
    AbortBatch,
}

/// Drives a `Job` through its states.
pub struct JobMachine;

impl JobMachine {
    pub fn start(job: &mut Job) {
        job.enter(JobState::InFlight);
    }

    pub fn succeed(job: &mut Job, text: String) -> BatchOutcome {
        job.enter(JobState::Success);
        BatchOutcome::Text(text)
    }

    pub fn cancel(job: &mut Job) -> BatchOutcome {
        job.enter(JobState::Cancelled);
        BatchOutcome::Cancelled
    }

    /// Compute the next step for a failed call and apply it to the job.
    ///
    /// - `ItemFailure` finishes the job as `Errored`.
    /// - `TransientRetry` backs off linearly until `max_transient_retries` is
    ///   exceeded, then finishes as `Errored`.
    /// - `RateLimitRetry` backs off exponentially (never shorter than the
    ///   server's `retry-after`, capped) until `max_rate_limit_retries` is
    ///   exceeded, then aborts the batch.
    pub fn fail(job: &mut Job, decision: RetryDecision, config: &BatchRunConfig) -> Step {
        let step = match decision {
            RetryDecision::ItemFailure => Step::Finish(BatchOutcome::Errored),
            RetryDecision::TransientRetry => {
                job.attempt_count += 1;
                if job.attempt_count <= config.max_transient_retries {
                    Step::Backoff {
                        state: JobState::TransientBackoff,
                        delay: config.transient_delay(job.attempt_count),
                    }
                } else {
                    Step::Finish(BatchOutcome::Errored)
                }
            }
            RetryDecision::RateLimitRetry { retry_after } => {
                job.rate_limit_retry_count += 1;
                if job.rate_limit_retry_count <= config.max_rate_limit_retries {
                    let computed = config.rate_limit_delay(job.rate_limit_retry_count);
                    let hinted = retry_after
                        .map(|d| d.min(config.rate_limit_backoff_cap))
                        .unwrap_or_default();
                    Step::Backoff {
                        state: JobState::RateLimitBackoff,
                        delay: computed.max(hinted),
                    }
                } else {
                    Step::AbortBatch
                }
            }
        };

        match &step {
            Step::Backoff { state, .. } => job.enter(*state),
            Step::Finish(_) | Step::AbortBatch => job.enter(JobState::ItemFailure),
        }

        step
    }
}
