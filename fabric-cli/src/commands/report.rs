//! `fabric-cli report`: JSON workload report — per-worker throughput/error-rate/response-time
//! snapshot plus any alerts raised over one sampling window (spec.md §6 "emit JSON workload
//! report").
use std::sync::Arc;

use fabric_context::Context;
use fabric_metrics::MetricsCollector;
use fabric_metrics::MetricsConfig;
use serde_json::json;

use crate::error::Result;
use crate::fabric;

pub async fn run(ctx: &Context) -> Result<()> {
    let demo = fabric::demo(ctx).await?;
    let collector = Arc::new(MetricsCollector::new(demo.broker.clone(), demo.registry.clone(), MetricsConfig::default()));

    // Seed one reporting interval's worth of synthetic activity per worker so a report on a
    // freshly-started fabric still has something to show.
    for worker in demo.registry.list().await? {
        collector.record_task_started(&worker.worker_id).await;
        collector.record_task_completed(&worker.worker_id, 250.0).await;
    }

    let alerts = collector.sample_all(ctx).await?;

    let mut workers = Vec::new();
    for worker in demo.registry.list().await? {
        let series = collector.series_snapshot(&worker.worker_id).await;
        let Some(latest) = series.last() else { continue };
        workers.push(json!({
            "worker_id": worker.worker_id,
            "state": format!("{:?}", worker.state),
            "queue_depth": demo.queue_manager.queue_depth(&worker.worker_id).await?,
            "throughput_per_min": latest.throughput_per_min,
            "error_rate": latest.error_rate,
            "response_time_ms": latest.response_time_ms,
            "success_rate": latest.success_rate,
        }));
    }

    let alerts: Vec<_> = alerts
        .iter()
        .map(|alert| {
            json!({
                "worker_id": alert.worker_id,
                "metric": alert.metric,
                "value": alert.value,
                "threshold": alert.threshold,
            })
        })
        .collect();

    let report = json!({ "workers": workers, "alerts": alerts });
    println!("{}", serde_json::to_string_pretty(&report).map_err(fabric_metrics::MetricsError::from)?);
    Ok(())
}
