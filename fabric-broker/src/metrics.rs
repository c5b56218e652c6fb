//! Prometheus metrics for broker operations.
//!
//! Registration follows the "log and ignore" convention used throughout the control plane this
//! workspace descends from: a metric that fails to register (e.g. because the process already
//! registered it once) is logged at warning level rather than causing a panic.
use prometheus::CounterVec;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;
use slog::Logger;

lazy_static::lazy_static! {
    pub static ref BROKER_OPS: CounterVec = CounterVec::new(
        Opts::new(
            "fabric_broker_ops_total",
            "Number of broker operations performed, by operation and result."
        ),
        &["op", "result"]
    )
    .expect("fabric_broker_ops_total counter options should be valid");

    pub static ref BROKER_OP_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "fabric_broker_op_duration_seconds",
            "Duration of broker operations in seconds, by operation."
        ),
        &["op"]
    )
    .expect("fabric_broker_op_duration_seconds histogram options should be valid");
}

/// Attempt to register broker metrics with the given registry.
///
/// Metrics that fail to register are logged and ignored so that re-initialisation (tests,
/// embedding multiple components in one process) never panics.
pub fn register_metrics(logger: &Logger, registry: &Registry) {
    if let Err(error) = registry.register(Box::new(BROKER_OPS.clone())) {
        slog::debug!(logger, "Failed to register fabric_broker_ops_total"; "error" => %error);
    }
    if let Err(error) = registry.register(Box::new(BROKER_OP_DURATION.clone())) {
        slog::debug!(logger, "Failed to register fabric_broker_op_duration_seconds"; "error" => %error);
    }
}
