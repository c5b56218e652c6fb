//! Per-worker circuit breaker, keyed on Executor endpoint (spec.md §4.6).
//!
//! No teacher precedent in-pack for this; written in the same idiom as [`crate::backoff::Backoff`]
//! — a plain struct with `record_success`/`record_failure`/`allow` methods, no external crate.
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Opens after `failure_threshold` failures inside `window`; a half-open breaker admits exactly
/// one probe call, closing on success and reopening on failure.
pub struct CircuitBreaker {
    state: BreakerState,
    failures: VecDeque<Instant>,
    failure_threshold: usize,
    window: Duration,
    opened_at: Option<Instant>,
    reset_after: Duration,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, window: Duration, reset_after: Duration) -> CircuitBreaker {
        CircuitBreaker {
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            failure_threshold,
            window,
            opened_at: None,
            reset_after,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a new Executor invocation may proceed. A half-open breaker admits exactly one
    /// concurrent probe; callers that are refused should treat this as `CircuitOpen`
    /// (spec.md §7 "Return task to queue without consuming attempts").
    pub fn allow(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if self.opened_at.map(|at| at.elapsed() >= self.reset_after).unwrap_or(false) {
                    self.state = BreakerState::HalfOpen;
                    self.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failures.clear();
        self.state = BreakerState::Closed;
        self.opened_at = None;
        self.probe_in_flight = false;
    }

    pub fn record_failure(&mut self) {
        self.probe_in_flight = false;
        if self.state == BreakerState::HalfOpen {
            self.open();
            return;
        }
        let now = Instant::now();
        self.failures.push_back(now);
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        if self.failures.len() >= self.failure_threshold {
            self.open();
        }
    }

    fn open(&mut self) {
        self.state = BreakerState::Open;
        self.opened_at = Some(Instant::now());
        self.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_millis(10));
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn half_open_admits_single_probe() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(1));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow());
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(1));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_breaker() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60), Duration::from_millis(1));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
