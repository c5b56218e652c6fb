//! Per-queue enqueue / reliable lease / ack / requeue / DLQ, with a bounded transaction log.
pub mod config;
pub mod error;
pub mod manager;
pub mod task;

pub use config::QueueConfig;
pub use config::TaskQueue;
pub use error::QueueError;
pub use error::Result;
pub use manager::Failure;
pub use manager::NackOutcome;
pub use manager::QueueManager;
pub use task::fingerprint;
pub use task::Payload;
pub use task::Priority;
pub use task::Task;
pub use task::TxlogEvent;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fabric_broker::MemoryBroker;
    use fabric_context::Context;

    use super::*;

    fn manager() -> QueueManager<String> {
        let broker = Arc::new(MemoryBroker::new());
        QueueManager::new(broker, QueueConfig::default())
    }

    fn payload() -> Payload {
        Payload {
            request: "summarize the attached document".to_string(),
            file: Some("doc-1".to_string()),
            priority: Priority::Normal,
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    #[tokio::test]
    async fn enqueue_then_lease_then_ack() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        manager.enqueue(&ctx, &queue, task).await.unwrap();
        assert_eq!(manager.queue_depth(&queue).await.unwrap(), 1);

        let leased = manager.lease(&ctx, &queue).await.unwrap().unwrap();
        assert!(leased.start_time.is_some());
        assert_eq!(manager.processing_depth(&queue).await.unwrap(), 1);

        let acked = manager.ack(&ctx, &queue, &leased).await.unwrap();
        assert!(acked);
        assert_eq!(manager.processing_depth(&queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_requeues_until_exhausted_then_dlqs() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        manager.enqueue(&ctx, &queue, task).await.unwrap();

        let mut current = manager.lease(&ctx, &queue).await.unwrap().unwrap();
        for _ in 0..manager.config().max_attempts - 1 {
            let outcome = manager
                .nack(&ctx, &queue, current.clone(), Failure::Transient, "rate limited")
                .await
                .unwrap();
            current = match outcome {
                NackOutcome::Requeued(task) => task,
                NackOutcome::DeadLettered(_) => panic!("should not dlq before exhausting attempts"),
            };
            current = manager.lease(&ctx, &queue).await.unwrap().unwrap();
        }

        let outcome = manager
            .nack(&ctx, &queue, current, Failure::Transient, "rate limited again")
            .await
            .unwrap();
        assert!(matches!(outcome, NackOutcome::DeadLettered(_)));
        assert_eq!(manager.dlq_depth(&queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_dlqs_on_first_attempt() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        manager.enqueue(&ctx, &queue, task).await.unwrap();
        let leased = manager.lease(&ctx, &queue).await.unwrap().unwrap();

        let outcome = manager
            .nack(&ctx, &queue, leased, Failure::Permanent, "unauthorized")
            .await
            .unwrap();
        assert!(matches!(outcome, NackOutcome::DeadLettered(_)));
    }

    #[tokio::test]
    async fn stuck_task_is_recoverable() {
        let mut config = QueueConfig::default();
        config.stuck_threshold_secs = 0;
        let broker = Arc::new(MemoryBroker::new());
        let manager = QueueManager::<String>::new(broker, config);
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        manager.enqueue(&ctx, &queue, task).await.unwrap();
        let leased = manager.lease(&ctx, &queue).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let stuck = manager.stuck_tasks(&queue).await.unwrap();
        assert_eq!(stuck.len(), 1);

        let recovered = manager.recover_stuck(&ctx, &queue, leased).await.unwrap();
        assert!(recovered.previously_stuck);
        assert_eq!(recovered.attempts, 1);
        assert_eq!(manager.processing_depth(&queue).await.unwrap(), 0);
        assert_eq!(manager.queue_depth(&queue).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dlq_retry_is_dampened_then_rejected_second_time() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        manager.enqueue(&ctx, &queue, task).await.unwrap();
        let leased = manager.lease(&ctx, &queue).await.unwrap().unwrap();
        let dlqd = manager
            .nack(&ctx, &queue, leased, Failure::Permanent, "unauthorized")
            .await
            .unwrap();
        let task = match dlqd {
            NackOutcome::DeadLettered(task) => task,
            NackOutcome::Requeued(_) => panic!("expected dead letter"),
        };

        let retried = manager.retry_from_dlq(&ctx, &queue, task).await.unwrap();
        assert!(retried.retried_from_dlq);
        assert_eq!(manager.queue_depth(&queue).await.unwrap(), 1);

        let again = manager.retry_from_dlq(&ctx, &queue, retried).await;
        assert!(again.is_err());
    }

    #[test]
    fn fingerprint_is_reexported() {
        let fp = fingerprint(&payload());
        assert_eq!(fp.len(), 64);
    }

    #[tokio::test]
    async fn drain_queue_empties_pending_tasks() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        manager.enqueue(&ctx, &queue, Task::new(queue.clone(), payload())).await.unwrap();
        manager.enqueue(&ctx, &queue, Task::new(queue.clone(), payload())).await.unwrap();

        let drained = manager.drain_queue(&ctx, &queue).await.unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(manager.queue_depth(&queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drain_processing_empties_in_flight_tasks() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        manager.enqueue(&ctx, &queue, Task::new(queue.clone(), payload())).await.unwrap();
        manager.lease(&ctx, &queue).await.unwrap().unwrap();
        assert_eq!(manager.processing_depth(&queue).await.unwrap(), 1);

        let drained = manager.drain_processing(&ctx, &queue).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(manager.processing_depth(&queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dlq_direct_moves_an_unleased_task_straight_to_the_dlq() {
        let manager = manager();
        let ctx = Context::fixture();
        let queue = "llm-default".to_string();

        let task = Task::new(queue.clone(), payload());
        let dlqd = manager.dlq_direct(&ctx, &queue, task, "no_available_target").await.unwrap();

        assert_eq!(dlqd.last_error.as_deref(), Some("no_available_target"));
        assert_eq!(manager.dlq_depth(&queue).await.unwrap(), 1);
    }
}
