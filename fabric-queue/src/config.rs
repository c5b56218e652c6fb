//! Queue naming and per-queue configuration (spec.md §4.2).
use std::hash::Hash;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Application-defined queue identifier.
///
/// Mirrors `tasks::backend::TaskQueue`: applications can use a plain `String` for maximum
/// flexibility, or a closed enum for compile-time checked queue names. Anything implementing
/// these bounds can be used as a queue key.
pub trait TaskQueue: Clone + Eq + Hash + Send + Sync + 'static {
    /// The broker key fragment this queue maps to (`queue:<name()>`, `processing:<name()>`, ...).
    fn name(&self) -> String;
}

impl TaskQueue for String {
    fn name(&self) -> String {
        self.clone()
    }
}

/// Per-queue tunables (spec.md §4.2, §6 glossary `stuckThreshold`/`maxAttempts`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of attempts (including the first) before a task is moved to the DLQ.
    #[serde(default = "QueueConfig::default_max_attempts")]
    pub max_attempts: u16,

    /// How long, in seconds, a task may sit in `processing:Q` before Health Monitor considers
    /// it stuck and eligible for recovery.
    #[serde(default = "QueueConfig::default_stuck_threshold_secs")]
    pub stuck_threshold_secs: u64,

    /// Base delay before the first nack/requeue retry; doubles on each subsequent attempt up to
    /// `TasksExecutorBackoff`-style exponential backoff (spec.md "Rate-limit backoff" example).
    #[serde(default = "QueueConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum bounded length of `txlog:Q` (spec.md "bounded sorted set of recent events").
    #[serde(default = "QueueConfig::default_txlog_capacity")]
    pub txlog_capacity: usize,

    /// Hard cap on total DLQ retries per task (spec.md §9, recommended default 3).
    #[serde(default = "QueueConfig::default_max_dlq_retries")]
    pub max_dlq_retries: u16,

    /// Minimum time between DLQ retries of the same task (spec.md §9 "5-minute dampener").
    #[serde(default = "QueueConfig::default_dlq_retry_dampener_secs")]
    pub dlq_retry_dampener_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_attempts: QueueConfig::default_max_attempts(),
            stuck_threshold_secs: QueueConfig::default_stuck_threshold_secs(),
            retry_delay_ms: QueueConfig::default_retry_delay_ms(),
            txlog_capacity: QueueConfig::default_txlog_capacity(),
            max_dlq_retries: QueueConfig::default_max_dlq_retries(),
            dlq_retry_dampener_secs: QueueConfig::default_dlq_retry_dampener_secs(),
        }
    }
}

impl QueueConfig {
    pub fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn dlq_retry_dampener(&self) -> Duration {
        Duration::from_secs(self.dlq_retry_dampener_secs)
    }

    fn default_max_attempts() -> u16 {
        5
    }

    fn default_stuck_threshold_secs() -> u64 {
        3600
    }

    fn default_retry_delay_ms() -> u64 {
        200
    }

    fn default_txlog_capacity() -> usize {
        1000
    }

    fn default_max_dlq_retries() -> u16 {
        3
    }

    fn default_dlq_retry_dampener_secs() -> u64 {
        300
    }
}
