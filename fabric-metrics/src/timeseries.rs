//! Fixed-capacity ring buffer of [`MetricSample`]s (spec.md §9 "bounded ring... with explicit
//! capacity" redesign guidance for the original's in-process unbounded maps).
use std::collections::VecDeque;

use crate::sample::MetricSample;

/// A 24h-rolling (by default) ring buffer of samples for one worker.
pub struct TimeSeries {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl TimeSeries {
    pub fn new(capacity: usize) -> TimeSeries {
        TimeSeries {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Capacity implied by a rolling `window` sampled every `interval` (spec.md "24h rolling...
    /// sampled every 10s" -> 8640 entries by default).
    pub fn capacity_for(window: std::time::Duration, interval: std::time::Duration) -> usize {
        let interval_secs = interval.as_secs_f64().max(f64::EPSILON);
        (window.as_secs_f64() / interval_secs).ceil() as usize
    }

    pub fn push(&mut self, sample: MetricSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn point(worker_id: &str) -> MetricSample {
        MetricSample {
            worker_id: worker_id.to_string(),
            ts: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().into(),
            throughput_per_min: 0.0,
            memory: 0.0,
            error_rate: 0.0,
            response_time_ms: 0.0,
            success_rate: 1.0,
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut series = TimeSeries::new(2);
        series.push(point("worker-a"));
        series.push(point("worker-b"));
        series.push(point("worker-c"));
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest().unwrap().worker_id, "worker-c");
    }

    #[test]
    fn capacity_for_default_window_is_8640() {
        let capacity = TimeSeries::capacity_for(Duration::from_secs(24 * 3600), Duration::from_secs(10));
        assert_eq!(capacity, 8640);
    }
}
