//! Cumulative per-worker counters (spec.md §4.9 "Per-worker counters").
use std::collections::HashMap;

/// Running totals for one worker since it was first observed by the collector.
///
/// Kept cumulative rather than reset per sample so that `delta_since` can derive a rate (e.g.
/// tasks/minute) between any two snapshots without losing counts taken between samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkerCounters {
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub api_calls_total: u64,
    pub api_calls_successful: u64,
    pub api_calls_rate_limited: u64,
    task_duration_ms_total: u64,
    task_duration_samples: u64,
    response_time_ms_total: u64,
    response_time_samples: u64,
    pub error_taxonomy: HashMap<&'static str, u64>,
}

impl WorkerCounters {
    pub fn record_task_started(&mut self) {
        self.tasks_started += 1;
    }

    pub fn record_task_completed(&mut self, duration_ms: f64) {
        self.tasks_completed += 1;
        self.task_duration_ms_total += duration_ms as u64;
        self.task_duration_samples += 1;
    }

    pub fn record_task_failed(&mut self, duration_ms: f64, error_category: &'static str) {
        self.tasks_failed += 1;
        self.task_duration_ms_total += duration_ms as u64;
        self.task_duration_samples += 1;
        *self.error_taxonomy.entry(error_category).or_insert(0) += 1;
    }

    pub fn record_api_call(&mut self, successful: bool, rate_limited: bool, response_time_ms: f64) {
        self.api_calls_total += 1;
        if successful {
            self.api_calls_successful += 1;
        }
        if rate_limited {
            self.api_calls_rate_limited += 1;
        }
        self.response_time_ms_total += response_time_ms as u64;
        self.response_time_samples += 1;
    }

    /// Fraction of completed tasks out of all tasks finished (completed + failed).
    pub fn success_rate(&self) -> f64 {
        let finished = self.tasks_completed + self.tasks_failed;
        if finished == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / finished as f64
        }
    }

    pub fn mean_task_duration_ms(&self) -> f64 {
        if self.task_duration_samples == 0 {
            0.0
        } else {
            self.task_duration_ms_total as f64 / self.task_duration_samples as f64
        }
    }

    pub fn mean_response_time_ms(&self) -> f64 {
        if self.response_time_samples == 0 {
            0.0
        } else {
            self.response_time_ms_total as f64 / self.response_time_samples as f64
        }
    }

    /// This counter's totals minus `prior`'s, used to derive a rate over the interval between
    /// two samples (spec.md "tasks/minute", "error rate/minute").
    pub fn delta_since(&self, prior: &WorkerCounters) -> WorkerCounters {
        let mut error_taxonomy = HashMap::new();
        for (category, count) in &self.error_taxonomy {
            let prior_count = prior.error_taxonomy.get(category).copied().unwrap_or(0);
            error_taxonomy.insert(*category, count.saturating_sub(prior_count));
        }
        WorkerCounters {
            tasks_started: self.tasks_started.saturating_sub(prior.tasks_started),
            tasks_completed: self.tasks_completed.saturating_sub(prior.tasks_completed),
            tasks_failed: self.tasks_failed.saturating_sub(prior.tasks_failed),
            api_calls_total: self.api_calls_total.saturating_sub(prior.api_calls_total),
            api_calls_successful: self.api_calls_successful.saturating_sub(prior.api_calls_successful),
            api_calls_rate_limited: self.api_calls_rate_limited.saturating_sub(prior.api_calls_rate_limited),
            task_duration_ms_total: self.task_duration_ms_total.saturating_sub(prior.task_duration_ms_total),
            task_duration_samples: self.task_duration_samples.saturating_sub(prior.task_duration_samples),
            response_time_ms_total: self.response_time_ms_total.saturating_sub(prior.response_time_ms_total),
            response_time_samples: self.response_time_samples.saturating_sub(prior.response_time_samples),
            error_taxonomy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_with_no_finished_tasks_is_optimistic() {
        let counters = WorkerCounters::default();
        assert_eq!(counters.success_rate(), 1.0);
    }

    #[test]
    fn delta_since_tracks_interval_activity() {
        let mut prior = WorkerCounters::default();
        prior.record_task_completed(100.0);

        let mut current = prior.clone();
        current.record_task_completed(200.0);
        current.record_task_failed(50.0, "timeout");

        let delta = current.delta_since(&prior);
        assert_eq!(delta.tasks_completed, 1);
        assert_eq!(delta.tasks_failed, 1);
        assert_eq!(delta.error_taxonomy.get("timeout"), Some(&1));
    }
}
