//! Worker retry/backoff policy (§4.6): `delay = base_delay * 2^(retry_count-1)
//! * jitter`, jitter uniform in `[0.5, 1.0)`, bounded by a maximum retry
//! count after which the record is marked `failed` and dead-lettered by
//! acceptance rather than requeued again.

use rand::Rng;
use std::time::Duration;

/// Retry budget and backoff shape for the worker's retry-decide state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before the delivery is marked `failed`
    /// and acked (dead-lettered by acceptance). Defaults to `3` per §4.6.
    pub max_retries: u32,
    /// Base delay multiplied into the exponential backoff. Defaults to
    /// `10s` per §4.6.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether another retry attempt is allowed given the delivery's
    /// current `retry_count`.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Backoff delay for the retry that will bring the delivery from
    /// `retry_count` to `retry_count + 1`: `base_delay * 2^(retry_count-1)
    /// * jitter`, `jitter` uniform in `[0.5, 1.0)`.
    ///
    /// `retry_count` is 1-based here (the first retry uses `retry_count =
    /// 1`), matching the exponent in §4.6 directly.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let base_secs = self.base_delay.as_secs_f64() * 2f64.powi(exponent as i32);
        let jitter = rand::rng().random_range(0.5..1.0);
        Duration::from_secs_f64(base_secs * jitter)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
