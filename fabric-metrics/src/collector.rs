//! The Metrics Collector: accumulates per-worker counters, samples them into a bounded time
//! series, and raises/publishes/persists threshold alerts (spec.md §4.9).
use std::collections::HashMap;
use std::sync::Arc;

use fabric_broker::BrokerClient;
use fabric_context::Context;
use fabric_registry::Registry;
use serde_json::json;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;

use crate::alert;
use crate::alert::Alert;
use crate::alert::AlertHistory;
use crate::config::MetricsConfig;
use crate::counters::WorkerCounters;
use crate::error::Result;
use crate::registry as metrics_registry;
use crate::sample;
use crate::sample::MetricSample;
use crate::timeseries::TimeSeries;

const ALERT_CHANNEL: &str = "metrics:alert";

struct Tracked {
    counters: WorkerCounters,
    last_sampled: WorkerCounters,
    series: TimeSeries,
}

impl Tracked {
    fn new(capacity: usize) -> Tracked {
        Tracked {
            counters: WorkerCounters::default(),
            last_sampled: WorkerCounters::default(),
            series: TimeSeries::new(capacity),
        }
    }
}

/// Handle returned by [`MetricsCollector::start`].
pub struct MetricsCollectorHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl MetricsCollectorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// Accumulates counters and time series for every worker the fabric reports activity for.
pub struct MetricsCollector {
    broker: Arc<dyn BrokerClient>,
    registry: Arc<Registry>,
    config: MetricsConfig,
    tracked: AsyncMutex<HashMap<String, Tracked>>,
    alerts: AsyncMutex<AlertHistory>,
}

impl MetricsCollector {
    pub fn new(broker: Arc<dyn BrokerClient>, registry: Arc<Registry>, config: MetricsConfig) -> MetricsCollector {
        let alert_history_capacity = config.alert_history_capacity;
        MetricsCollector {
            broker,
            registry,
            config,
            tracked: AsyncMutex::new(HashMap::new()),
            alerts: AsyncMutex::new(AlertHistory::new(alert_history_capacity)),
        }
    }

    fn entry<'a>(tracked: &'a mut HashMap<String, Tracked>, worker_id: &str, capacity: usize) -> &'a mut Tracked {
        tracked
            .entry(worker_id.to_string())
            .or_insert_with(|| Tracked::new(capacity))
    }

    pub async fn record_task_started(&self, worker_id: &str) {
        let mut tracked = self.tracked.lock().await;
        let entry = Self::entry(&mut tracked, worker_id, self.config.series_capacity());
        entry.counters.record_task_started();
    }

    pub async fn record_task_completed(&self, worker_id: &str, duration_ms: f64) {
        let mut tracked = self.tracked.lock().await;
        let entry = Self::entry(&mut tracked, worker_id, self.config.series_capacity());
        entry.counters.record_task_completed(duration_ms);
        metrics_registry::TASKS_TOTAL.with_label_values(&[worker_id, "completed"]).inc();
        metrics_registry::TASK_DURATION.with_label_values(&[worker_id]).observe(duration_ms / 1000.0);
    }

    pub async fn record_task_failed(&self, worker_id: &str, duration_ms: f64, error_category: &'static str) {
        let mut tracked = self.tracked.lock().await;
        let entry = Self::entry(&mut tracked, worker_id, self.config.series_capacity());
        entry.counters.record_task_failed(duration_ms, error_category);
        metrics_registry::TASKS_TOTAL.with_label_values(&[worker_id, "failed"]).inc();
        metrics_registry::TASK_DURATION.with_label_values(&[worker_id]).observe(duration_ms / 1000.0);
    }

    pub async fn record_api_call(&self, worker_id: &str, successful: bool, rate_limited: bool, response_time_ms: f64) {
        let mut tracked = self.tracked.lock().await;
        let entry = Self::entry(&mut tracked, worker_id, self.config.series_capacity());
        entry.counters.record_api_call(successful, rate_limited, response_time_ms);
        let result = if rate_limited { "rate_limited" } else if successful { "success" } else { "error" };
        metrics_registry::API_CALLS_TOTAL.with_label_values(&[worker_id, result]).inc();
    }

    /// Sample every tracked worker, pushing the new point onto its time series and raising any
    /// threshold alerts (spec.md "Alerts are emitted when any metric crosses a threshold").
    pub async fn sample_all(&self, ctx: &Context) -> Result<Vec<Alert>> {
        let workers = self.registry.list().await?;
        let memory_by_worker: HashMap<String, f64> = workers
            .into_iter()
            .map(|worker| (worker.worker_id, worker.resource_usage.memory))
            .collect();

        let mut raised = Vec::new();
        let mut tracked = self.tracked.lock().await;
        for (worker_id, entry) in tracked.iter_mut() {
            let memory = memory_by_worker.get(worker_id).copied().unwrap_or(0.0);
            let delta = entry.counters.delta_since(&entry.last_sampled);
            let point = sample::sample(worker_id.clone(), &delta, memory, self.config.sample_interval.as_secs_f64());
            entry.last_sampled = entry.counters.clone();
            entry.series.push(point.clone());
            raised.extend(self.evaluate(ctx, &point).await?);
        }
        Ok(raised)
    }

    async fn evaluate(&self, ctx: &Context, point: &MetricSample) -> Result<Vec<Alert>> {
        let alerts = alert::check_thresholds(point, &self.config.thresholds);
        for raised in &alerts {
            metrics_registry::ALERTS_TOTAL
                .with_label_values(&[&format!("{:?}", raised.metric)])
                .inc();
            self.alerts.lock().await.push(raised.clone());
            let entry = json!({
                "worker_id": raised.worker_id,
                "metric": raised.metric,
                "value": raised.value,
                "threshold": raised.threshold,
            })
            .to_string();
            self.broker.publish(ALERT_CHANNEL, &entry).await?;
            slog::warn!(
                ctx.logger, "Metric threshold crossed";
                "worker" => %raised.worker_id, "metric" => ?raised.metric, "value" => raised.value,
            );
        }
        Ok(alerts)
    }

    /// Snapshot of a worker's time series, oldest first.
    pub async fn series_snapshot(&self, worker_id: &str) -> Vec<MetricSample> {
        self.tracked
            .lock()
            .await
            .get(worker_id)
            .map(|entry| entry.series.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of recently raised alerts, oldest first.
    pub async fn alert_history(&self) -> Vec<Alert> {
        self.alerts.lock().await.iter().cloned().collect()
    }

    /// Spawn the periodic sampling loop (spec.md "sampled every 10s").
    pub fn start(self: Arc<Self>, ctx: Context) -> MetricsCollectorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let collector = self.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(collector.config.sample_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = collector.sample_all(&ctx).await {
                            slog::warn!(ctx.logger, "Metrics sampling cycle failed"; "error" => %error);
                        }
                    }
                }
            }
        });
        MetricsCollectorHandle { shutdown: shutdown_tx, join }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fabric_broker::MemoryBroker;
    use fabric_registry::HeartbeatConfig;
    use fabric_registry::Worker;

    use super::*;

    fn collector() -> (Arc<MetricsCollector>, Arc<Registry>) {
        let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let collector = Arc::new(MetricsCollector::new(broker, registry.clone(), MetricsConfig::default()));
        (collector, registry)
    }

    #[tokio::test]
    async fn sampling_derives_throughput_and_raises_no_alert_when_healthy() {
        let (collector, registry) = collector();
        let ctx = Context::fixture();
        registry.register(&ctx, Worker::new("worker-a", "openai", "gpt-4", 4, "us-east")).await.unwrap();

        collector.record_task_started("worker-a").await;
        collector.record_task_completed("worker-a", 120.0).await;

        let alerts = collector.sample_all(&ctx).await.unwrap();
        assert!(alerts.is_empty());

        let series = collector.series_snapshot("worker-a").await;
        assert_eq!(series.len(), 1);
        assert!(series[0].throughput_per_min > 0.0);
    }

    #[tokio::test]
    async fn high_error_rate_raises_and_persists_alert() {
        let (collector, registry) = collector();
        let ctx = Context::fixture();
        registry.register(&ctx, Worker::new("worker-a", "openai", "gpt-4", 4, "us-east")).await.unwrap();

        collector.record_task_failed("worker-a", 50.0, "timeout").await;
        collector.record_task_failed("worker-a", 50.0, "timeout").await;

        let alerts = collector.sample_all(&ctx).await.unwrap();
        assert!(alerts.iter().any(|alert| alert.metric == alert::AlertMetric::ErrorRate));
        assert_eq!(collector.alert_history().await.len(), alerts.len());
    }
}
