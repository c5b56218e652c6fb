//! The Health Monitor & Auto-Corrector: periodic queue health assessment plus the corrective
//! actions in spec.md §4.8's table, using the tick-interval component-loop shape `bin/replicante`
//! uses for its background components.
use std::sync::Arc;

use fabric_broker::BrokerClient;
use fabric_context::Context;
use fabric_dispatch::Balancer;
use fabric_queue::QueueManager;
use fabric_registry::Registry;
use serde_json::json;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;

use crate::assessment;
use crate::assessment::QueueHealth;
use crate::config::HealthConfig;
use crate::correction::CorrectionAction;
use crate::correction::CorrectionRecord;
use crate::correction::History;
use crate::error::Result;

const CORRECTION_CHANNEL: &str = "health:correction";
const ORCHESTRATOR_COMMAND_CHANNEL: &str = "orchestrator:command";

/// Handle returned by [`HealthMonitor::start`]; dropping it does not stop the loop, call
/// [`HealthMonitorHandle::stop`] explicitly.
pub struct HealthMonitorHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl HealthMonitorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

/// Continuously assesses every registered worker's home queue and applies spec.md §4.8's
/// corrective actions.
pub struct HealthMonitor {
    broker: Arc<dyn BrokerClient>,
    registry: Arc<Registry>,
    queue_manager: Arc<QueueManager<String>>,
    balancer: AsyncMutex<Balancer>,
    config: HealthConfig,
    history: AsyncMutex<History>,
}

impl HealthMonitor {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        registry: Arc<Registry>,
        queue_manager: Arc<QueueManager<String>>,
        balancer: Balancer,
        config: HealthConfig,
    ) -> HealthMonitor {
        let history = History::new(config.history_capacity);
        HealthMonitor {
            broker,
            registry,
            queue_manager,
            balancer: AsyncMutex::new(balancer),
            config,
            history: AsyncMutex::new(history),
        }
    }

    /// Spawn the periodic check loop (spec.md "Every `checkInterval` (default 5 s)").
    pub fn start(self: Arc<Self>, ctx: Context) -> HealthMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = self.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.check_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = monitor.run_cycle(&ctx).await {
                            slog::warn!(ctx.logger, "Health check cycle failed"; "error" => %error);
                        }
                    }
                }
            }
        });
        HealthMonitorHandle { shutdown: shutdown_tx, join }
    }

    /// Assess every registered worker's home queue and apply corrections (spec.md §4.8).
    ///
    /// Home queues are named after the worker that owns them (`queue:<workerId>`, the same
    /// convention the Dispatcher enqueues onto), so the registered worker set doubles as the
    /// list of queues to check.
    pub async fn run_cycle(&self, ctx: &Context) -> Result<Vec<CorrectionRecord>> {
        let workers = self.registry.list().await.unwrap_or_default();
        let mut applied = Vec::new();
        for worker in workers {
            let health = assessment::assess(&self.queue_manager, &worker.worker_id, &self.config).await?;
            let corrections = self.correct(ctx, &worker.worker_id, &health).await?;
            applied.extend(corrections);
        }
        Ok(applied)
    }

    /// Apply whichever corrections `health` warrants for `queue`, recording each to the bounded
    /// history buffer and publishing it (spec.md "every outcome is published").
    pub async fn correct(&self, ctx: &Context, queue: &str, health: &QueueHealth) -> Result<Vec<CorrectionRecord>> {
        let mut applied = Vec::new();
        let thresholds = &self.config.thresholds;

        if health.stuck_severity(thresholds) != assessment::Severity::Ok {
            applied.extend(self.recover_stuck(ctx, queue).await?);
        }
        if health.depth_severity(thresholds) != assessment::Severity::Ok {
            applied.extend(self.handle_high_depth(ctx, queue, health).await?);
        }
        if health.failure_rate_severity(thresholds) != assessment::Severity::Ok {
            applied.extend(self.flag_problematic_worker(ctx, queue, health).await);
        }
        if health.dlq_severity(thresholds) != assessment::Severity::Ok {
            applied.extend(self.retry_dlq(ctx, queue).await?);
        }
        Ok(applied)
    }

    /// Requeue each stuck task to the head of its queue with raised priority (spec.md §4.8
    /// "stuck" row).
    async fn recover_stuck(&self, ctx: &Context, queue: &str) -> Result<Vec<CorrectionRecord>> {
        let stuck = self.queue_manager.stuck_tasks(&queue.to_string()).await?;
        let mut records = Vec::with_capacity(stuck.len());
        for task in stuck {
            let task_id = task.id;
            self.queue_manager.recover_stuck(ctx, &queue.to_string(), task).await?;
            let action = CorrectionAction::RequeueStuck { task_id };
            self.record(queue, action.clone()).await;
            records.push(CorrectionRecord { queue: queue.to_string(), action, ts: chrono::Utc::now() });
        }
        Ok(records)
    }

    /// Publish `scale_up(queue)` and attempt redistribution to other healthy queues (spec.md
    /// §4.8 "high depth" row).
    async fn handle_high_depth(&self, ctx: &Context, queue: &str, health: &QueueHealth) -> Result<Vec<CorrectionRecord>> {
        let mut records = Vec::new();
        self.broker
            .publish(
                ORCHESTRATOR_COMMAND_CHANNEL,
                &json!({"command": "scale_up", "queue": queue, "depth": health.depth}).to_string(),
            )
            .await?;
        let scale_up = CorrectionAction::ScaleUp { depth: health.depth };
        self.record(queue, scale_up.clone()).await;
        records.push(CorrectionRecord { queue: queue.to_string(), action: scale_up, ts: chrono::Utc::now() });

        let migrations = self.balancer.lock().await.run_cycle(ctx).await;
        if !migrations.is_empty() {
            let redistribute = CorrectionAction::Redistribute { migrated: migrations.len() };
            self.record(queue, redistribute.clone()).await;
            records.push(CorrectionRecord { queue: queue.to_string(), action: redistribute, ts: chrono::Utc::now() });
        }
        Ok(records)
    }

    /// Flag a worker whose home queue shows an elevated recent failure count (spec.md §4.8
    /// "high failure rate" row).
    async fn flag_problematic_worker(&self, _ctx: &Context, queue: &str, health: &QueueHealth) -> Vec<CorrectionRecord> {
        if health.recent_failures < self.config.problematic_worker_failures {
            return Vec::new();
        }
        let action = CorrectionAction::FlagWorker {
            worker_id: queue.to_string(),
            recent_failures: health.recent_failures,
        };
        self.record(queue, action.clone()).await;
        vec![CorrectionRecord { queue: queue.to_string(), action, ts: chrono::Utc::now() }]
    }

    /// Scan up to `dlq_scan_limit` head DLQ entries and move retriable ones back onto the main
    /// queue (spec.md §4.8 "high DLQ" row).
    async fn retry_dlq(&self, ctx: &Context, queue: &str) -> Result<Vec<CorrectionRecord>> {
        let entries = self.queue_manager.dlq_peek(&queue.to_string(), self.config.dlq_scan_limit).await?;
        let mut records = Vec::with_capacity(entries.len());
        for task in entries {
            let task_id = task.id;
            let is_permanent = task.last_error_kind.as_deref() == Some("permanent");
            if is_permanent || task.attempts >= self.config.dlq_retriable_attempts {
                continue;
            }
            match self.queue_manager.retry_from_dlq(ctx, &queue.to_string(), task).await {
                Ok(_) => {
                    let action = CorrectionAction::DlqRetry { task_id };
                    self.record(queue, action.clone()).await;
                    records.push(CorrectionRecord { queue: queue.to_string(), action, ts: chrono::Utc::now() });
                }
                Err(fabric_queue::QueueError::DlqRetryRejected(reason)) => {
                    let action = CorrectionAction::DlqRetryRejected { task_id, reason: reason.to_string() };
                    self.record(queue, action.clone()).await;
                    records.push(CorrectionRecord { queue: queue.to_string(), action, ts: chrono::Utc::now() });
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(records)
    }

    async fn record(&self, queue: &str, action: CorrectionAction) {
        self.history.lock().await.push(queue, action.clone());
        let entry = json!({"queue": queue, "kind": action.kind()}).to_string();
        let _ = self.broker.publish(CORRECTION_CHANNEL, &entry).await;
    }

    /// Snapshot of recently applied corrections, oldest first (spec.md "bounded (default
    /// 1000)").
    pub async fn history(&self) -> Vec<CorrectionRecord> {
        self.history.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fabric_broker::MemoryBroker;
    use fabric_dispatch::BalancerConfig;
    use fabric_queue::Failure;
    use fabric_queue::Payload;
    use fabric_queue::QueueConfig;
    use fabric_queue::Task;
    use fabric_registry::HeartbeatConfig;
    use fabric_registry::Worker;

    use super::*;

    fn payload() -> Payload {
        Payload {
            request: "summarize this".to_string(),
            file: None,
            priority: Default::default(),
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    async fn monitor_with(config: HealthConfig) -> (Arc<HealthMonitor>, Arc<QueueManager<String>>, Arc<Registry>) {
        let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let mut queue_config = QueueConfig::default();
        queue_config.stuck_threshold_secs = 0;
        let queue_manager = Arc::new(QueueManager::new(broker.clone(), queue_config));
        let balancer = Balancer::new(registry.clone(), queue_manager.clone(), BalancerConfig::default());
        let monitor = Arc::new(HealthMonitor::new(broker, registry.clone(), queue_manager.clone(), balancer, config));
        (monitor, queue_manager, registry)
    }

    #[tokio::test]
    async fn recovers_stuck_task_with_raised_priority() {
        let (monitor, queue_manager, registry) = monitor_with(HealthConfig::default()).await;
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, worker).await.unwrap();

        let queue = "worker-a".to_string();
        queue_manager.enqueue(&ctx, &queue, Task::new("worker-a", payload())).await.unwrap();
        queue_manager.lease(&ctx, &queue).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let applied = monitor.run_cycle(&ctx).await.unwrap();
        assert!(applied.iter().any(|record| matches!(record.action, CorrectionAction::RequeueStuck { .. })));
        assert_eq!(queue_manager.processing_depth(&queue).await.unwrap(), 0);
        assert_eq!(queue_manager.queue_depth(&queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn high_dlq_depth_retries_eligible_tasks() {
        let mut config = HealthConfig::default();
        config.thresholds.dlq_depth_warn = 0;
        let (monitor, queue_manager, registry) = monitor_with(config).await;
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, worker).await.unwrap();

        let queue = "worker-a".to_string();
        queue_manager.enqueue(&ctx, &queue, Task::new("worker-a", payload())).await.unwrap();
        let leased = queue_manager.lease(&ctx, &queue).await.unwrap().unwrap();
        queue_manager.nack(&ctx, &queue, leased, Failure::Permanent, "unauthorized").await.unwrap();
        assert_eq!(queue_manager.dlq_depth(&queue).await.unwrap(), 1);

        // Permanent failures stay in the DLQ: not retriable (spec.md §4.8 "not permanent-classified").
        let applied = monitor.run_cycle(&ctx).await.unwrap();
        assert!(!applied.iter().any(|record| matches!(record.action, CorrectionAction::DlqRetry { .. })));
        assert_eq!(queue_manager.dlq_depth(&queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn flags_worker_with_elevated_recent_failures() {
        let mut config = HealthConfig::default();
        config.thresholds.failure_rate_warn = 0.0;
        config.problematic_worker_failures = 1;
        let (monitor, queue_manager, registry) = monitor_with(config).await;
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, worker).await.unwrap();

        let queue = "worker-a".to_string();
        queue_manager.enqueue(&ctx, &queue, Task::new("worker-a", payload())).await.unwrap();
        let leased = queue_manager.lease(&ctx, &queue).await.unwrap().unwrap();
        queue_manager.nack(&ctx, &queue, leased, Failure::Permanent, "unauthorized").await.unwrap();

        let applied = monitor.run_cycle(&ctx).await.unwrap();
        assert!(applied.iter().any(|record| matches!(record.action, CorrectionAction::FlagWorker { .. })));
    }
}
