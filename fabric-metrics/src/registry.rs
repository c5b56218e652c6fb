//! Prometheus metrics for the collector itself, following the same "log and ignore"
//! registration convention as `fabric_broker::metrics`.
use prometheus::CounterVec;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;
use slog::Logger;

lazy_static::lazy_static! {
    pub static ref TASKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "fabric_metrics_tasks_total",
            "Number of tasks observed by the metrics collector, by worker and outcome."
        ),
        &["worker", "outcome"]
    )
    .expect("fabric_metrics_tasks_total counter options should be valid");

    pub static ref API_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "fabric_metrics_api_calls_total",
            "Number of upstream API calls observed, by worker and result."
        ),
        &["worker", "result"]
    )
    .expect("fabric_metrics_api_calls_total counter options should be valid");

    pub static ref TASK_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "fabric_metrics_task_duration_seconds",
            "Observed task duration in seconds, by worker."
        ),
        &["worker"]
    )
    .expect("fabric_metrics_task_duration_seconds histogram options should be valid");

    pub static ref ALERTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "fabric_metrics_alerts_total",
            "Number of threshold alerts raised, by metric."
        ),
        &["metric"]
    )
    .expect("fabric_metrics_alerts_total counter options should be valid");
}

/// Attempt to register collector metrics; failures are logged and ignored.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(TASKS_TOTAL.clone())) {
        slog::debug!(logger, "Failed to register fabric_metrics_tasks_total"; "error" => %error);
    }
    if let Err(error) = registry.register(Box::new(API_CALLS_TOTAL.clone())) {
        slog::debug!(logger, "Failed to register fabric_metrics_api_calls_total"; "error" => %error);
    }
    if let Err(error) = registry.register(Box::new(TASK_DURATION.clone())) {
        slog::debug!(logger, "Failed to register fabric_metrics_task_duration_seconds"; "error" => %error);
    }
    if let Err(error) = registry.register(Box::new(ALERTS_TOTAL.clone())) {
        slog::debug!(logger, "Failed to register fabric_metrics_alerts_total"; "error" => %error);
    }
}
