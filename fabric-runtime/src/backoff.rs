//! Track failures and successes to incrementally delay retries (grounded on
//! `core/tasks/src/execute/backoff.rs`, with jitter added per spec.md §4.6/§7).
use std::time::Duration;

use fabric_context::Context;
use rand::Rng;

/// Jittered exponential backoff: `base * 2^attempt`, capped at `max_delay`, for use in
/// looping operations.
///
/// - When a loop encounters an error call [`Backoff::retry`].
/// - When a loop completes call [`Backoff::success`] to clear memory of previous failures.
pub struct Backoff {
    delay: Duration,
    max_delay: Duration,
    max_retries: u16,
    multiplier: u32,
    seen: u16,
    start_delay: Duration,
}

/// Raised by [`Backoff::retry`] once `max_retries` consecutive failures have been seen.
#[derive(Debug, thiserror::Error)]
#[error("exceeded maximum of {0} retries")]
pub struct RetriesExceeded(pub u16);

impl Backoff {
    pub fn new(start_delay: Duration, max_delay: Duration, multiplier: u32, max_retries: u16) -> Backoff {
        Backoff {
            delay: start_delay,
            max_delay,
            max_retries,
            multiplier,
            seen: 0,
            start_delay,
        }
    }

    /// An attempt failed: sleep for the current delay plus jitter, then grow the delay. Returns
    /// an error once `max_retries` consecutive failures have accumulated.
    pub async fn retry(&mut self, context: &Context, error: &str) -> Result<(), RetriesExceeded> {
        self.seen += 1;
        if self.seen > self.max_retries {
            return Err(RetriesExceeded(self.max_retries));
        }

        slog::warn!(
            context.logger, "Retrying after executor error";
            "error" => error, "attempt" => self.seen, "delay_ms" => self.delay.as_millis() as u64,
        );
        tokio::time::sleep(self.jittered()).await;
        self.delay = std::cmp::min(self.delay * self.multiplier, self.max_delay);
        Ok(())
    }

    /// Add up to 25% jitter on top of the current delay, so multiple concurrently retrying
    /// loops don't all wake up at exactly the same instant.
    fn jittered(&self) -> Duration {
        let jitter_ms = rand::thread_rng().gen_range(0..=(self.delay.as_millis() as u64 / 4).max(1));
        self.delay + Duration::from_millis(jitter_ms)
    }

    pub fn success(&mut self) {
        self.delay = self.start_delay;
        self.seen = 0;
    }

    pub fn attempts_seen(&self) -> u16 {
        self.seen
    }

    /// Jittered delay for the `attempt`-th retry (0-indexed) of a per-task backoff: `base *
    /// multiplier^attempt`, capped at `max_delay`, plus up to 25% jitter (spec.md §4.6 step 8
    /// "base*2^attempt with jitter, up to maxRetries"). Stateless, unlike [`Backoff::retry`]: a
    /// caller backing off one task at a time keys the exponent off `task.attempts` instead of
    /// threading a shared counter across unrelated tasks.
    pub fn delay_for_attempt(start_delay: Duration, max_delay: Duration, multiplier: u32, attempt: u16) -> Duration {
        let grown = start_delay.saturating_mul(multiplier.saturating_pow(attempt as u32));
        let delay = std::cmp::min(grown, max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=(delay.as_millis() as u64 / 4).max(1));
        delay + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_grows_delay_and_resets_on_success() {
        let ctx = Context::fixture();
        let mut backoff = Backoff::new(
            Duration::from_millis(1),
            Duration::from_millis(100),
            2,
            5,
        );
        backoff.retry(&ctx, "boom").await.unwrap();
        assert_eq!(backoff.attempts_seen(), 1);
        backoff.success();
        assert_eq!(backoff.attempts_seen(), 0);
    }

    #[tokio::test]
    async fn retries_exceeded_after_max() {
        let ctx = Context::fixture();
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 2, 2);
        backoff.retry(&ctx, "one").await.unwrap();
        backoff.retry(&ctx, "two").await.unwrap();
        let result = backoff.retry(&ctx, "three").await;
        assert!(result.is_err());
    }

    #[test]
    fn delay_for_attempt_lower_bound_matches_spec_scenario_3() {
        // spec.md §8 scenario 3: three consecutive rate-limited retries must sleep through at
        // least base*(2^0+2^1+2^2) before the task succeeds.
        let start = Duration::from_millis(10);
        let max = Duration::from_secs(10);
        let total: Duration = (0..3u16)
            .map(|attempt| Backoff::delay_for_attempt(start, max, 2, attempt))
            .sum();
        let floor = start * (1 + 2 + 4);
        assert!(total >= floor, "{total:?} should be at least {floor:?}");
    }

    #[test]
    fn delay_for_attempt_is_capped_at_max_delay() {
        let start = Duration::from_millis(100);
        let max = Duration::from_millis(150);
        let delay = Backoff::delay_for_attempt(start, max, 2, 10);
        assert!(delay >= max, "jitter only adds to the capped base, never below it: {delay:?}");
        assert!(delay <= max + max / 4 + Duration::from_millis(1));
    }
}
