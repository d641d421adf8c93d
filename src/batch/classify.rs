//! Maps a failed inference call to a retry decision.

use std::time::Duration;

use crate::vision::InferenceError;

/// What the scheduler should do with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Network-layer trouble: back off linearly and try again.
    TransientRetry,
    /// The server is throttling us: back off exponentially. `retry_after` is the server's hint.
    RateLimitRetry { retry_after: Option<Duration> },
    /// Retrying cannot help; fail this job only.
    ItemFailure,
}

pub fn classify(err: &InferenceError) -> RetryDecision {
    match err {
        InferenceError::InputUnreadable { .. } | InferenceError::MalformedResponse { .. } => {
            RetryDecision::ItemFailure
        }
        InferenceError::RateLimited { retry_after } => RetryDecision::RateLimitRetry {
            retry_after: *retry_after,
        },
        InferenceError::Http { status: 429, .. } => {
            RetryDecision::RateLimitRetry { retry_after: None }
        }
        InferenceError::Http { body: msg, .. } | InferenceError::Network(msg)
            if mentions_rate_limit(msg) =>
        {
            RetryDecision::RateLimitRetry { retry_after: None }
        }
        InferenceError::Timeout | InferenceError::Network(_) | InferenceError::Http { .. } => {
            RetryDecision::TransientRetry
        }
    }
}

/// Some gateways wrap a 429 in another status or in a transport error; look for the usual wording.
fn mentions_rate_limit(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    ["429", "rate limit", "rate_limit", "ratelimit", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle))
}
