//! Worker registration, capability advertisement, liveness, and deregistration.
pub mod error;
pub mod registry;
pub mod state;
pub mod worker;

pub use error::RegistryError;
pub use error::Result;
pub use registry::HeartbeatConfig;
pub use registry::Registry;
pub use registry::StatusSnapshot;
pub use state::classify_health;
pub use state::transition;
pub use state::HealthThresholds;
pub use state::WorkerState;
pub use worker::HealthSignals;
pub use worker::ResourceUsage;
pub use worker::Worker;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use fabric_broker::MemoryBroker;
    use fabric_context::Context;

    use super::*;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryBroker::new()), HeartbeatConfig::default())
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = registry();
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east").with_capability("coding");
        let registered = registry.register(&ctx, worker).await.unwrap();
        assert_eq!(registered.state, WorkerState::Active);

        let fetched = registry.get("worker-a").await.unwrap();
        assert_eq!(fetched.worker_id, "worker-a");
        assert!(fetched.capabilities.contains("coding"));
    }

    #[tokio::test]
    async fn heartbeat_degrades_and_recovers() {
        let registry = registry();
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        let worker = registry.register(&ctx, worker).await.unwrap();

        let degraded_usage = ResourceUsage {
            memory: 0.95,
            ..Default::default()
        };
        let worker = registry
            .heartbeat(&ctx, worker, degraded_usage, HealthSignals::default())
            .await
            .unwrap();
        assert_eq!(worker.state, WorkerState::Critical);

        let healthy_usage = ResourceUsage::default();
        let worker = registry
            .heartbeat(&ctx, worker, healthy_usage, HealthSignals::default())
            .await
            .unwrap();
        assert_eq!(worker.state, WorkerState::Active);
    }

    #[tokio::test]
    async fn deregister_removes_record() {
        let registry = registry();
        let ctx = Context::fixture();
        let worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        let worker = registry.register(&ctx, worker).await.unwrap();
        registry.deregister(&ctx, worker).await.unwrap();
        assert!(registry.get("worker-a").await.is_err());
    }

    #[test]
    fn stale_worker_is_detected() {
        let mut config = HeartbeatConfig::default();
        config.interval_secs = 0;
        let registry = Registry::new(Arc::new(MemoryBroker::new()), config);
        let mut worker = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");

        worker.last_heartbeat = Utc::now();
        assert!(!registry.is_stale(&worker));

        worker.last_heartbeat = Utc::now() - chrono::Duration::seconds(5);
        assert!(registry.is_stale(&worker));
    }
}
