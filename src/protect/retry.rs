//! Bounded exponential backoff for transient upstream failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamError;

/// Configuration for retry behavior around one protected call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub min_delay_ms: u64,
    /// Ceiling the exponential curve is clamped to.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based):
    /// min_delay * 2^(attempt - 1), clamped to max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .min_delay_ms
            .saturating_mul(2u64.pow(exp))
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Only classified-transient upstream failures are retried. Validation,
    /// auth, parse errors and breaker-open signals never reach this path.
    pub fn should_retry(&self, attempt: u32, error: &UpstreamError) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(16_000));
        // Clamped to the configured ceiling from here on.
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(12), Duration::from_millis(30_000));
    }

    #[test]
    fn retries_only_transient_errors() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, &UpstreamError::Timeout));
        assert!(policy.should_retry(
            2,
            &UpstreamError::Server {
                status: 500,
                message: "boom".into()
            }
        ));
        assert!(!policy.should_retry(1, &UpstreamError::Auth { status: 401 }));
        assert!(!policy.should_retry(1, &UpstreamError::Parse("bad".into())));
    }

    #[test]
    fn attempt_budget_is_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_retry(2, &UpstreamError::Timeout));
        assert!(!policy.should_retry(3, &UpstreamError::Timeout));
    }
}
