//! Tunables for the metrics collector (spec.md §4.9).
use std::time::Duration;

use crate::alert::AlertThresholds;
use crate::timeseries::TimeSeries;

/// Sampling cadence, rolling window, and alert tunables.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsConfig {
    /// How often a sample is taken per worker ("sampled every 10s").
    pub sample_interval: Duration,
    /// How far back the time series rolls ("24h rolling").
    pub window: Duration,
    pub thresholds: AlertThresholds,
    /// Bounded capacity of the alert history list.
    pub alert_history_capacity: usize,
}

impl MetricsConfig {
    pub fn series_capacity(&self) -> usize {
        TimeSeries::capacity_for(self.window, self.sample_interval)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            sample_interval: Duration::from_secs(10),
            window: Duration::from_secs(24 * 3600),
            thresholds: AlertThresholds::default(),
            alert_history_capacity: 1000,
        }
    }
}
