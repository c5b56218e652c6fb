//! Sliding 60-second call-rate limiter (spec.md §4.6 step 4).
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Tracks Executor invocation timestamps over a trailing 60-second window and reports how long a
/// caller must wait before the window has room for one more call.
pub struct RateLimiter {
    calls: VecDeque<Instant>,
    limit_per_minute: u32,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> RateLimiter {
        RateLimiter {
            calls: VecDeque::new(),
            limit_per_minute,
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long the caller must sleep before a call would be admitted, or `None` if one is
    /// admissible right now (spec.md "if calls/min >= rateLimit, wait until the oldest call ages
    /// out").
    pub fn wait_for(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.evict_expired(now);
        if (self.calls.len() as u32) < self.limit_per_minute {
            None
        } else {
            let oldest = *self.calls.front().expect("limit_per_minute > 0 implies non-empty");
            Some(WINDOW.saturating_sub(now.duration_since(oldest)))
        }
    }

    /// Record that a call was made, consuming one slot in the window.
    pub fn record_call(&mut self) {
        self.calls.push_back(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_calls_under_the_limit() {
        let mut limiter = RateLimiter::new(3);
        assert!(limiter.wait_for().is_none());
        limiter.record_call();
        assert!(limiter.wait_for().is_none());
        limiter.record_call();
        assert!(limiter.wait_for().is_none());
        limiter.record_call();
        assert!(limiter.wait_for().is_some());
    }

    #[test]
    fn wait_hint_is_bounded_by_the_window() {
        let mut limiter = RateLimiter::new(1);
        limiter.record_call();
        let wait = limiter.wait_for().unwrap();
        assert!(wait <= WINDOW);
    }
}
