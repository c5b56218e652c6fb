//! Queue health assessment, stuck-task recovery, DLQ retry, and scale-up signalling (spec.md
//! §4.8 "Health Monitor & Auto-Corrector").
pub mod assessment;
pub mod config;
pub mod correction;
pub mod error;
pub mod monitor;

pub use assessment::assess;
pub use assessment::classify_error_category;
pub use assessment::QueueHealth;
pub use assessment::Severity;
pub use config::HealthConfig;
pub use config::HealthThresholds;
pub use correction::CorrectionAction;
pub use correction::CorrectionRecord;
pub use correction::History;
pub use error::HealthError;
pub use error::Result;
pub use monitor::HealthMonitor;
pub use monitor::HealthMonitorHandle;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fabric_broker::BrokerClient;
    use fabric_broker::MemoryBroker;
    use fabric_context::Context;
    use fabric_dispatch::Balancer;
    use fabric_dispatch::BalancerConfig;
    use fabric_queue::Payload;
    use fabric_queue::QueueConfig;
    use fabric_queue::QueueManager;
    use fabric_queue::Task;
    use fabric_registry::HeartbeatConfig;
    use fabric_registry::Registry;
    use fabric_registry::Worker;

    use super::*;

    fn payload() -> Payload {
        Payload {
            request: "translate this paragraph".to_string(),
            file: None,
            priority: Default::default(),
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    /// End-to-end scenario: a task gets stuck in processing, the monitor's next cycle recovers
    /// it to the head of the queue, and the correction is visible in its bounded history.
    #[tokio::test]
    async fn stuck_task_scenario_is_recovered_and_recorded() {
        let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let mut queue_config = QueueConfig::default();
        queue_config.stuck_threshold_secs = 0;
        let queue_manager = Arc::new(QueueManager::new(broker.clone(), queue_config));
        let balancer = Balancer::new(registry.clone(), queue_manager.clone(), BalancerConfig::default());
        let monitor = Arc::new(HealthMonitor::new(
            broker,
            registry.clone(),
            queue_manager.clone(),
            balancer,
            HealthConfig::default(),
        ));

        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, worker).await.unwrap();

        let queue = "worker-a".to_string();
        queue_manager.enqueue(&ctx, &queue, Task::new("worker-a", payload())).await.unwrap();
        queue_manager.lease(&ctx, &queue).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        monitor.run_cycle(&ctx).await.unwrap();
        assert_eq!(queue_manager.processing_depth(&queue).await.unwrap(), 0);
        assert_eq!(queue_manager.queue_depth(&queue).await.unwrap(), 1);

        let history = monitor.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action.kind(), "requeue_stuck");
    }

    /// End-to-end scenario: a transient failure lands a task in the DLQ, and the next health
    /// cycle retries it back onto the main queue once the DLQ depth crosses the warning
    /// threshold.
    #[tokio::test]
    async fn dlq_retry_scenario_requeues_transient_failure() {
        let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let queue_manager = Arc::new(QueueManager::new(broker.clone(), QueueConfig::default()));
        let balancer = Balancer::new(registry.clone(), queue_manager.clone(), BalancerConfig::default());
        let mut config = HealthConfig::default();
        config.thresholds.dlq_depth_warn = 0;
        let monitor = Arc::new(HealthMonitor::new(
            broker,
            registry.clone(),
            queue_manager.clone(),
            balancer,
            config,
        ));

        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, worker).await.unwrap();

        let queue = "worker-a".to_string();
        queue_manager.enqueue(&ctx, &queue, Task::new("worker-a", payload())).await.unwrap();

        // Repeated transient failures exhaust max_attempts and land the task in the DLQ,
        // mirroring how a flaky upstream call would play out in production.
        let mut current = queue_manager.lease(&ctx, &queue).await.unwrap().unwrap();
        for _ in 0..(queue_manager.config().max_attempts - 1) {
            let outcome = queue_manager
                .nack(&ctx, &queue, current, fabric_queue::Failure::Transient, "rate limited")
                .await
                .unwrap();
            current = match outcome {
                fabric_queue::NackOutcome::Requeued(task) => task,
                fabric_queue::NackOutcome::DeadLettered(_) => panic!("should not dlq early"),
            };
            current = queue_manager.lease(&ctx, &queue).await.unwrap().unwrap();
        }
        let outcome = queue_manager
            .nack(&ctx, &queue, current, fabric_queue::Failure::Transient, "rate limited")
            .await
            .unwrap();
        assert!(matches!(outcome, fabric_queue::NackOutcome::DeadLettered(_)));
        assert_eq!(queue_manager.dlq_depth(&queue).await.unwrap(), 1);

        let applied = monitor.run_cycle(&ctx).await.unwrap();
        assert!(applied.iter().any(|record| record.action.kind() == "dlq_retry"));
        assert_eq!(queue_manager.dlq_depth(&queue).await.unwrap(), 0);
        assert_eq!(queue_manager.queue_depth(&queue).await.unwrap(), 1);
    }
}
