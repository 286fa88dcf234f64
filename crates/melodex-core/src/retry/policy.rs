use std::time::Duration;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the job goes to `failed`.
    NoRetry,
    /// Retry after the given delay; the job goes back to `pending`.
    RetryAfter(Duration),
}

/// The scheduler's automatic retry policy — `spec.md` §4.2: up to 3 attempts,
/// linear delays of `retry_count * base_delay` (`1s, 2s, 3s` with the default
/// `base_delay`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `retry_count` is the count *after* incrementing for this failure
    /// (1-based: the first retry has `retry_count == 1`). Returns
    /// `NoRetry` once `retry_count` reaches `max_attempts`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if retry_count > self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.base_delay * retry_count)
    }
}
