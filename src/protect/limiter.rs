//! Sliding-window call admission control.
//!
//! One instance is shared process-wide: every protected call, from every
//! concurrent job, draws on the same budget. `acquire` is non-blocking;
//! a `false` means "retry later", never an error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    // Admission timestamps within the trailing window, oldest first.
    // Pruned lazily on every check.
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to admit one call. Records a timestamp and returns `true` when
    /// under the limit; returns `false` with no side effect otherwise.
    pub fn acquire(&self) -> bool {
        self.acquire_at(Instant::now())
    }

    /// Admission check against an explicit clock reading. The lock is held
    /// only for the decision, so no two callers can spend the same slot.
    pub fn acquire_at(&self, now: Instant) -> bool {
        let mut admitted = self.admitted.lock().expect("rate limiter lock poisoned");
        while let Some(front) = admitted.front() {
            if now.duration_since(*front) > self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
        if admitted.len() < self.max_calls as usize {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long a denied caller should wait before asking again: one
    /// even share of the window per call slot.
    pub fn suggested_backoff(&self) -> Duration {
        self.window / self.max_calls.max(1)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let now = Instant::now();

        // 15 calls within one second: exactly 10 admitted, 5 rejected.
        let mut admitted = 0;
        for i in 0..15 {
            if limiter.acquire_at(now + Duration::from_millis(i * 60)) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[test]
    fn rejection_has_no_side_effect() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.acquire_at(now));
        assert!(limiter.acquire_at(now));
        // Rejected calls must not consume future slots.
        for _ in 0..100 {
            assert!(!limiter.acquire_at(now));
        }
        // Past the window both slots free up again.
        let later = now + Duration::from_secs(61);
        assert!(limiter.acquire_at(later));
        assert!(limiter.acquire_at(later));
    }

    #[test]
    fn stale_entries_prune_as_window_slides() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limiter.acquire_at(t0));
        assert!(limiter.acquire_at(t0 + Duration::from_secs(4)));
        assert!(limiter.acquire_at(t0 + Duration::from_secs(8)));
        assert!(!limiter.acquire_at(t0 + Duration::from_secs(9)));
        // t0's entry ages out at t0+10s.
        assert!(limiter.acquire_at(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn never_more_than_limit_in_any_trailing_window() {
        let max = 5;
        let window = Duration::from_secs(60);
        let limiter = RateLimiter::new(max, window);
        let t0 = Instant::now();

        // Dense call sequence over three windows' worth of synthetic time.
        let mut admissions: Vec<Instant> = Vec::new();
        for step in 0..600u64 {
            let now = t0 + Duration::from_millis(step * 300);
            if limiter.acquire_at(now) {
                admissions.push(now);
            }
        }

        // Property: every trailing window holds at most `max` admissions.
        for (i, start) in admissions.iter().enumerate() {
            let in_window = admissions[i..]
                .iter()
                .take_while(|t| t.duration_since(*start) <= window)
                .count();
            assert!(in_window <= max as usize, "window starting at index {i} held {in_window}");
        }
    }

    #[test]
    fn suggested_backoff_is_window_share() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        assert_eq!(limiter.suggested_backoff(), Duration::from_secs(6));
    }

    #[test]
    fn concurrent_callers_cannot_double_spend() {
        use std::sync::Arc;
        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(std::thread::spawn(move || {
                let mut got = 0u32;
                for _ in 0..50 {
                    if limiter.acquire() {
                        got += 1;
                    }
                }
                got
            }));
        }
        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
    }
}
