//! Per-worker counters, 24h rolling time-series samples, and threshold alerting (spec.md §4.9
//! "Metrics & Alerts").
pub mod alert;
pub mod collector;
pub mod config;
pub mod counters;
pub mod error;
pub mod registry;
pub mod sample;
pub mod timeseries;

pub use alert::check_thresholds;
pub use alert::Alert;
pub use alert::AlertHistory;
pub use alert::AlertMetric;
pub use alert::AlertThresholds;
pub use collector::MetricsCollector;
pub use collector::MetricsCollectorHandle;
pub use config::MetricsConfig;
pub use counters::WorkerCounters;
pub use error::MetricsError;
pub use error::Result;
pub use registry::register_metrics;
pub use sample::sample;
pub use sample::MetricSample;
pub use timeseries::TimeSeries;
