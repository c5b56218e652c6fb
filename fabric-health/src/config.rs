//! Thresholds and tunables driving queue health assessment and auto-correction (spec.md §4.8).
use std::time::Duration;

/// Warning/critical thresholds for the four health signals (spec.md §4.8 threshold table).
#[derive(Clone, Debug, PartialEq)]
pub struct HealthThresholds {
    /// `depth` warning threshold; there is no critical tier for depth, only a scale-up
    /// trigger.
    pub depth_warn: usize,
    /// Any stuck task at all is a warning; `stuck_crit` is the critical count.
    pub stuck_crit: usize,
    pub failure_rate_warn: f64,
    pub dlq_depth_warn: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        HealthThresholds {
            depth_warn: 100,
            stuck_crit: 10,
            failure_rate_warn: 0.20,
            dlq_depth_warn: 50,
        }
    }
}

/// Tunables for the Health Monitor's periodic loop and corrective actions (spec.md §4.8, §9).
#[derive(Clone, Debug, PartialEq)]
pub struct HealthConfig {
    /// How often a full assessment + correction cycle runs.
    pub check_interval: Duration,
    pub thresholds: HealthThresholds,
    /// Window over which `failureRate` is computed ("over last hour").
    pub failure_rate_window: Duration,
    /// Number of recent failures that marks a worker "problematic" (spec.md "workers (>5 recent
    /// failures)").
    pub problematic_worker_failures: usize,
    /// Up to how many head DLQ entries the periodic scan inspects per cycle.
    pub dlq_scan_limit: usize,
    /// `attempts` ceiling below which a DLQ'd task is still considered retriable, independent of
    /// [`fabric_queue::QueueConfig::max_dlq_retries`] (spec.md §4.8 "attempts < 5").
    pub dlq_retriable_attempts: u16,
    /// Bounded capacity of the correction history buffer (spec.md "bounded (default 1000)").
    pub history_capacity: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            check_interval: Duration::from_secs(5),
            thresholds: HealthThresholds::default(),
            failure_rate_window: Duration::from_secs(3600),
            problematic_worker_failures: 5,
            dlq_scan_limit: 20,
            dlq_retriable_attempts: 5,
            history_capacity: 1000,
        }
    }
}
