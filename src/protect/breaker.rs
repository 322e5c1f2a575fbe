//! Circuit breaker around the outbound generative call.
//!
//! States:
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: every call is rejected for the cooldown period
//! - HalfOpen: exactly one probe is allowed through
//!
//! Transitions happen only on call outcomes: the counter reaching the
//! threshold opens the breaker, a successful half-open probe closes it,
//! a failed probe re-opens it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Returned while the breaker is open; the gated function was not invoked.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("circuit breaker is open")]
pub struct BreakerOpen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Gate check before invoking the protected call. While open and within
    /// cooldown this rejects immediately; once the cooldown elapses the
    /// breaker moves to half-open and admits a single probe.
    pub fn admit(&self) -> Result<(), BreakerOpen> {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&self, now: Instant) -> Result<(), BreakerOpen> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { since } => {
                if now.duration_since(since) >= self.cooldown {
                    *state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(BreakerOpen)
                }
            }
            // The probe is in flight; reject everyone else until it reports.
            State::HalfOpen => Err(BreakerOpen),
        }
    }

    /// Record a successful call: closes the breaker and resets the counter.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        *state = State::Closed { failures: 0 };
    }

    /// Record a failed call. In closed state this bumps the counter and opens
    /// at the threshold; a failed half-open probe re-opens immediately.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    *state = State::Open { since: now };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen => {
                *state = State::Open { since: now };
            }
            State::Open { .. } => {}
        }
    }

    /// Whether the breaker currently rejects calls (no transition side effect).
    pub fn is_open(&self) -> bool {
        matches!(
            *self.state.lock().expect("breaker lock poisoned"),
            State::Open { .. }
        )
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(60))
    }

    #[test]
    fn opens_exactly_at_threshold() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.record_failure_at(now);
            assert!(b.admit_at(now).is_ok(), "must stay closed below threshold");
        }
        b.record_failure_at(now);
        assert_eq!(b.admit_at(now), Err(BreakerOpen));
    }

    #[test]
    fn rejects_everything_during_cooldown() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure_at(now);
        }
        for secs in [1u64, 10, 30, 59] {
            assert_eq!(b.admit_at(now + Duration::from_secs(secs)), Err(BreakerOpen));
        }
    }

    #[test]
    fn single_probe_after_cooldown() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure_at(now);
        }
        let after = now + Duration::from_secs(60);
        // Exactly one probe admitted.
        assert!(b.admit_at(after).is_ok());
        assert_eq!(b.admit_at(after), Err(BreakerOpen));
        assert_eq!(b.admit_at(after + Duration::from_secs(1)), Err(BreakerOpen));
    }

    #[test]
    fn probe_success_closes() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure_at(now);
        }
        let after = now + Duration::from_secs(60);
        assert!(b.admit_at(after).is_ok());
        b.record_success();
        assert!(b.admit_at(after).is_ok());
        assert!(!b.is_open());
    }

    #[test]
    fn probe_failure_reopens_for_full_cooldown() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..5 {
            b.record_failure_at(now);
        }
        let probe_time = now + Duration::from_secs(60);
        assert!(b.admit_at(probe_time).is_ok());
        b.record_failure_at(probe_time);
        // Re-opened: cooldown restarts from the failed probe.
        assert_eq!(
            b.admit_at(probe_time + Duration::from_secs(59)),
            Err(BreakerOpen)
        );
        assert!(b.admit_at(probe_time + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn success_resets_failure_counter() {
        let b = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            b.record_failure_at(now);
        }
        b.record_success();
        // Counter reset: four more failures still leave it closed.
        for _ in 0..4 {
            b.record_failure_at(now);
        }
        assert!(b.admit_at(now).is_ok());
    }
}
