//! Retry pacing

use std::time::Duration;

/// Attempt budget and backoff schedule for one logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Added on top of every rate-limit wait
    pub rate_limit_margin: Duration,
    /// Fixed wait after a transient failure
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            rate_limit_margin: Duration::from_secs(1),
            transient_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait after a rate limit on the given 1-based attempt.
    ///
    /// Grows with the attempt number, so repeated 429s back off harder than
    /// the server asked for.
    pub fn rate_limit_delay(&self, retry_after_secs: u64, attempt: u32) -> Duration {
        Duration::from_secs(retry_after_secs.saturating_mul(u64::from(attempt)))
            .saturating_add(self.rate_limit_margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.transient_delay, Duration::from_secs(10));
    }

    #[test]
    fn rate_limit_delay_scales_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(3, 1), Duration::from_secs(4));
        assert_eq!(policy.rate_limit_delay(3, 2), Duration::from_secs(7));
        assert_eq!(policy.rate_limit_delay(0, 5), Duration::from_secs(1));
    }

    #[test]
    fn rate_limit_delay_saturates() {
        let policy = RetryPolicy::default();
        let delay = policy.rate_limit_delay(u64::MAX, 10);
        assert_eq!(delay, Duration::MAX);
    }
}
