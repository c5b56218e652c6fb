//! Tunables for a single [`crate::runtime::WorkerRuntime`] (spec.md §4.6).
use std::collections::BTreeSet;
use std::time::Duration;

/// Per-worker runtime configuration.
pub struct RuntimeConfig {
    /// `maxConcurrency`: how many tasks this worker may execute at once.
    pub max_concurrency: usize,

    /// `rateLimit`: maximum Executor invocations per rolling 60s window.
    pub rate_limit_per_minute: u32,

    /// Deadline applied to an Executor invocation when `task.deadline_at` is unset.
    pub default_deadline: Duration,

    /// Circuit breaker `failureThreshold`.
    pub breaker_failure_threshold: usize,
    /// Circuit breaker `window`.
    pub breaker_window: Duration,
    /// How long an open breaker waits before admitting a half-open probe.
    pub breaker_reset_after: Duration,

    /// Base delay for the loop-level backoff applied after an Executor failure.
    pub backoff_start: Duration,
    /// Cap on the loop-level backoff delay.
    pub backoff_max: Duration,
    /// Multiplier applied to the loop-level backoff delay on each consecutive failure.
    pub backoff_multiplier: u32,
    /// Number of consecutive loop-level failures tolerated before giving up (the loop logs and
    /// keeps running rather than exiting; see `WorkerRuntime::run`).
    pub backoff_max_retries: u16,

    /// How long `Stop()` waits for in-flight tasks to drain before deregistering anyway.
    pub drain_timeout: Duration,

    /// Delay between fetch attempts when `queue:<homeQueue>` is empty (spec.md step 2).
    pub empty_queue_poll: Duration,
    /// Delay between capacity checks while the worker is at `maxConcurrency` or inactive
    /// (spec.md step 1).
    pub capacity_poll: Duration,

    /// How long to wait for a `lock:<resource>` release before the Conflict Arbiter's `Wait`
    /// resolution falls back to `Queue`, and before a `Coordinate` resolution gives up on the
    /// current holder finishing (spec.md §4.4).
    pub lock_wait_timeout: Duration,
    /// Resources (matched against `task.payload.file`) treated as critical for the Conflict
    /// Arbiter's `Override` row (spec.md §4.4 "Critical resource and high-priority tag ...
    /// override"). Empty by default: no resource is critical unless an operator names one.
    pub critical_resources: BTreeSet<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_concurrency: 4,
            rate_limit_per_minute: 60,
            default_deadline: Duration::from_secs(30),
            breaker_failure_threshold: 5,
            breaker_window: Duration::from_secs(60),
            breaker_reset_after: Duration::from_secs(30),
            backoff_start: Duration::from_millis(200),
            backoff_max: Duration::from_secs(30),
            backoff_multiplier: 2,
            backoff_max_retries: u16::MAX,
            drain_timeout: Duration::from_secs(30),
            empty_queue_poll: Duration::from_secs(1),
            capacity_poll: Duration::from_millis(200),
            lock_wait_timeout: Duration::from_secs(5),
            critical_resources: BTreeSet::new(),
        }
    }
}
