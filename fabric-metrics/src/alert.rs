//! Threshold alerting (spec.md "Alerts are emitted when any metric crosses a threshold; alerts
//! are both published to a channel and persisted to a bounded list").
use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::sample::MetricSample;

/// Which of the four tracked metrics an [`Alert`] was raised for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    Throughput,
    Memory,
    ErrorRate,
    ResponseTime,
}

/// Warning thresholds for the four tracked metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertThresholds {
    pub memory_warn: f64,
    pub error_rate_warn: f64,
    pub response_time_ms_warn: f64,
    /// A worker that has been sampled at least once but whose throughput falls to or below this
    /// floor is considered stalled.
    pub throughput_floor_per_min: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        AlertThresholds {
            memory_warn: 0.9,
            error_rate_warn: 0.2,
            response_time_ms_warn: 5000.0,
            throughput_floor_per_min: 0.0,
        }
    }
}

/// A single threshold crossing, scoped to the worker and sample it was derived from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub worker_id: String,
    pub metric: AlertMetric,
    pub value: f64,
    pub threshold: f64,
    pub ts: DateTime<Utc>,
}

/// Compare `sample` against `thresholds`, returning every metric that crossed its line.
pub fn check_thresholds(sample: &MetricSample, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if sample.memory > thresholds.memory_warn {
        alerts.push(Alert {
            worker_id: sample.worker_id.clone(),
            metric: AlertMetric::Memory,
            value: sample.memory,
            threshold: thresholds.memory_warn,
            ts: sample.ts,
        });
    }
    if sample.error_rate > thresholds.error_rate_warn {
        alerts.push(Alert {
            worker_id: sample.worker_id.clone(),
            metric: AlertMetric::ErrorRate,
            value: sample.error_rate,
            threshold: thresholds.error_rate_warn,
            ts: sample.ts,
        });
    }
    if sample.response_time_ms > thresholds.response_time_ms_warn {
        alerts.push(Alert {
            worker_id: sample.worker_id.clone(),
            metric: AlertMetric::ResponseTime,
            value: sample.response_time_ms,
            threshold: thresholds.response_time_ms_warn,
            ts: sample.ts,
        });
    }
    if sample.throughput_per_min <= thresholds.throughput_floor_per_min {
        alerts.push(Alert {
            worker_id: sample.worker_id.clone(),
            metric: AlertMetric::Throughput,
            value: sample.throughput_per_min,
            threshold: thresholds.throughput_floor_per_min,
            ts: sample.ts,
        });
    }
    alerts
}

/// Bounded ring of recently raised alerts (spec.md "persisted to a bounded list").
pub struct AlertHistory {
    entries: VecDeque<Alert>,
    capacity: usize,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> AlertHistory {
        AlertHistory {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(alert);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }
}
