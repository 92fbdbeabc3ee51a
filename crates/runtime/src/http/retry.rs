//! Transport-level retry policy.
//!
//! Retries apply only to transport errors that are demonstrably safe to
//! retry (the request never reached the server) and only for commands the
//! caller marks read-only. Server-acknowledged failures and timeouts are
//! never retried.

use std::time::Duration;

use rand::Rng;

use crate::error::FetchError;

/// Jittered exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether `error` on attempt number `attempt` (0-based) should be
    /// retried for a command with the given retryability.
    pub fn should_retry(&self, attempt: u32, error: &FetchError, retryable_command: bool) -> bool {
        retryable_command && attempt < self.max_retries && error.is_safely_retryable()
    }

    /// The jittered delay before retry number `attempt` (0-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        // Full jitter on the upper half keeps a floor under the delay.
        let jittered = exp.mul_f64(0.5 + rand::thread_rng().gen_range(0.0..=0.5));
        jittered.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;

    fn fetch_error(kind: FetchErrorKind) -> FetchError {
        FetchError {
            message: "boom".into(),
            url: "http://x".into(),
            kind,
        }
    }

    #[test]
    fn never_retries_non_retryable_commands() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, &fetch_error(FetchErrorKind::Connect), false));
    }

    #[test]
    fn never_retries_possibly_sent_requests() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, &fetch_error(FetchErrorKind::Request), true));
        assert!(!policy.should_retry(0, &fetch_error(FetchErrorKind::Cancelled), true));
    }

    #[test]
    fn retries_connect_failures_up_to_the_limit() {
        let policy = RetryPolicy::default();
        let err = fetch_error(FetchErrorKind::Connect);
        assert!(policy.should_retry(0, &err, true));
        assert!(policy.should_retry(1, &err, true));
        assert!(!policy.should_retry(2, &err, true));
    }

    #[test]
    fn backoff_grows_and_stays_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
        };
        for attempt in 0..5 {
            let delay = policy.backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(400));
        }
    }
}
