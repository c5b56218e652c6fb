//! Per-queue health assessment (spec.md §4.8): depth, DLQ depth, stuck processing count, and
//! failure rate over a trailing window, read straight off the bounded txlog and the broker's
//! list primitives — no separate metrics pipeline is needed for this.
use std::collections::HashMap;
use std::sync::Arc;

use fabric_queue::QueueManager;
use fabric_queue::TaskQueue;

use crate::config::HealthConfig;
use crate::error::Result;

/// Severity of one health signal against its configured threshold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

/// A snapshot of one queue's health, as computed by [`assess`].
#[derive(Clone, Debug)]
pub struct QueueHealth {
    pub queue: String,
    pub depth: usize,
    pub dlq_depth: usize,
    pub processing_count: usize,
    pub stuck_count: usize,
    pub failure_rate: f64,
    /// Count of `task_failed` txlog events observed inside the failure-rate window, used to
    /// identify "problematic workers (>5 recent failures)" (spec.md §4.8).
    pub recent_failures: usize,
    /// Recent failures bucketed by coarse error category (spec.md "bucket errors by category
    /// (timeout/rate_limit/connection/memory/parse)").
    pub error_buckets: HashMap<&'static str, usize>,
}

impl QueueHealth {
    pub fn depth_severity(&self, thresholds: &crate::config::HealthThresholds) -> Severity {
        if self.depth > thresholds.depth_warn {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    pub fn stuck_severity(&self, thresholds: &crate::config::HealthThresholds) -> Severity {
        if self.stuck_count >= thresholds.stuck_crit {
            Severity::Critical
        } else if self.stuck_count > 0 {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    pub fn failure_rate_severity(&self, thresholds: &crate::config::HealthThresholds) -> Severity {
        if self.failure_rate > thresholds.failure_rate_warn {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }

    pub fn dlq_severity(&self, thresholds: &crate::config::HealthThresholds) -> Severity {
        if self.dlq_depth > thresholds.dlq_depth_warn {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

/// Bucket a free-text error/reason string into one of five categories (spec.md §4.8), falling
/// back to `"other"` for anything unrecognized (e.g. a provider-specific 5xx message).
pub fn classify_error_category(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("timeout") || lower.contains("deadline") {
        "timeout"
    } else if lower.contains("rate") || lower.contains("429") || lower.contains("throttle") {
        "rate_limit"
    } else if lower.contains("connection") || lower.contains("reset") || lower.contains("refused") {
        "connection"
    } else if lower.contains("memory") || lower.contains("oom") {
        "memory"
    } else if lower.contains("parse") || lower.contains("malformed") || lower.contains("deserial") {
        "parse"
    } else {
        "other"
    }
}

/// Compute a fresh [`QueueHealth`] snapshot for `queue` (spec.md §4.8 "for each queue compute").
pub async fn assess<Q: TaskQueue>(
    queue_manager: &Arc<QueueManager<Q>>,
    queue: &Q,
    config: &HealthConfig,
) -> Result<QueueHealth> {
    let depth = queue_manager.queue_depth(queue).await?;
    let dlq_depth = queue_manager.dlq_depth(queue).await?;
    let processing_count = queue_manager.processing_depth(queue).await?;
    let stuck = queue_manager.stuck_tasks(queue).await?;
    let stuck_count = stuck.len();

    let events = queue_manager.recent_events(queue, config.failure_rate_window).await?;
    let mut failures = 0usize;
    let mut completions = 0usize;
    let mut error_buckets: HashMap<&'static str, usize> = HashMap::new();
    for event in &events {
        match event.event.as_str() {
            "task_failed" => {
                failures += 1;
                let text = event.error.clone().unwrap_or_default();
                *error_buckets.entry(classify_error_category(&text)).or_insert(0) += 1;
            }
            "task_completed" => completions += 1,
            _ => {}
        }
    }
    let total = failures + completions;
    let failure_rate = if total == 0 { 0.0 } else { failures as f64 / total as f64 };

    Ok(QueueHealth {
        queue: queue.name(),
        depth,
        dlq_depth,
        processing_count,
        stuck_count,
        failure_rate,
        recent_failures: failures,
        error_buckets,
    })
}
