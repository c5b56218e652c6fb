//! `MetricSample` (spec.md §3): the derived per-worker snapshot recorded into the time series.
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::counters::WorkerCounters;

/// One point of a worker's time series (spec.md "Time series: 24h rolling for throughput,
/// memory, error-rate, response-time, sampled every 10s").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub worker_id: String,
    pub ts: DateTime<Utc>,
    /// Tasks completed per minute, derived from the counter delta over the sampling interval.
    pub throughput_per_min: f64,
    /// Memory utilisation, `0.0..=1.0`, taken from the worker's latest heartbeat.
    pub memory: f64,
    /// Fraction of finished tasks (this interval) that failed.
    pub error_rate: f64,
    pub response_time_ms: f64,
    pub success_rate: f64,
}

/// Build a sample from the counter delta observed over `interval`, plus the worker's latest
/// reported memory utilisation (spec.md "Derived per sample: success rate, tasks/minute, error
/// rate/minute").
pub fn sample(worker_id: impl Into<String>, delta: &WorkerCounters, memory: f64, interval_secs: f64) -> MetricSample {
    let minutes = (interval_secs / 60.0).max(f64::EPSILON);
    let finished = delta.tasks_completed + delta.tasks_failed;
    let error_rate = if finished == 0 {
        0.0
    } else {
        delta.tasks_failed as f64 / finished as f64
    };
    MetricSample {
        worker_id: worker_id.into(),
        ts: Utc::now(),
        throughput_per_min: delta.tasks_completed as f64 / minutes,
        memory,
        error_rate,
        response_time_ms: delta.mean_response_time_ms(),
        success_rate: delta.success_rate(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_normalizes_to_per_minute() {
        let mut delta = WorkerCounters::default();
        delta.record_task_completed(10.0);
        delta.record_task_completed(10.0);
        let point = sample("worker-a", &delta, 0.2, 10.0);
        assert_eq!(point.throughput_per_min, 12.0);
        assert_eq!(point.error_rate, 0.0);
    }

    #[test]
    fn error_rate_reflects_failures_in_interval() {
        let mut delta = WorkerCounters::default();
        delta.record_task_completed(10.0);
        delta.record_task_failed(10.0, "timeout");
        let point = sample("worker-a", &delta, 0.1, 10.0);
        assert_eq!(point.error_rate, 0.5);
    }
}
