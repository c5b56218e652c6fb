//! A leased task must be explicitly resolved; dropping one unresolved panics (grounded on
//! `tasks/src/worker/mod.rs`'s `Task<Q>`/`Drop`).
use fabric_context::Context;
use fabric_queue::Failure;
use fabric_queue::NackOutcome;
use fabric_queue::QueueManager;
use fabric_queue::Task;
use fabric_queue::TaskQueue;

/// Wraps a [`Task`] pulled off [`QueueManager::lease`], forcing the caller to resolve it via
/// [`LeasedTask::success`], [`LeasedTask::fail`] or [`LeasedTask::skip`] before it goes out of
/// scope. Unlike `tasks/src/worker/mod.rs`'s `Task<Q>`, resolution here is async (the queue manager's
/// ack/nack calls go over the broker), so `resolved` is flipped synchronously at the top of each
/// resolving method, before the first `.await` point, so a cancelled future still leaves the
/// guard satisfied rather than panicking on drop for a reason outside the caller's control.
pub struct LeasedTask<Q: TaskQueue> {
    task: Option<Task>,
    resolved: bool,
    queue: Q,
}

impl<Q: TaskQueue> LeasedTask<Q> {
    pub fn new(task: Task, queue: Q) -> LeasedTask<Q> {
        LeasedTask {
            task: Some(task),
            resolved: false,
            queue,
        }
    }

    pub fn task(&self) -> &Task {
        self.task.as_ref().expect("task taken only on resolution")
    }

    /// Hand the task back unresolved by the Queue Manager's normal ack/nack paths, for callers
    /// that must return it to the queue through a different route (spec.md §7 `CircuitOpen`:
    /// the task is requeued via [`fabric_queue::QueueManager::requeue_unchanged`] rather than
    /// acked or nacked, since the attempt never reached the Executor).
    pub fn into_inner_unresolved(mut self) -> Task {
        self.resolved = true;
        self.task.take().expect("task present until resolved")
    }

    /// Ack the task (spec.md §4.6 step 7).
    pub async fn success(mut self, ctx: &Context, manager: &QueueManager<Q>) -> fabric_queue::Result<bool> {
        self.resolved = true;
        let task = self.task.take().expect("task present until resolved");
        manager.ack(ctx, &self.queue, &task).await
    }

    /// Record a retryable failure: requeue unless attempts are exhausted (spec.md §4.6 step 8).
    pub async fn fail(
        mut self,
        ctx: &Context,
        manager: &QueueManager<Q>,
        error: impl Into<String>,
    ) -> fabric_queue::Result<NackOutcome> {
        self.resolved = true;
        let task = self.task.take().expect("task present until resolved");
        manager.nack(ctx, &self.queue, task, Failure::Transient, error).await
    }

    /// Record a non-retryable failure: move straight to the DLQ (spec.md §4.6 step 9).
    pub async fn skip(
        mut self,
        ctx: &Context,
        manager: &QueueManager<Q>,
        error: impl Into<String>,
    ) -> fabric_queue::Result<NackOutcome> {
        self.resolved = true;
        let task = self.task.take().expect("task present until resolved");
        manager.nack(ctx, &self.queue, task, Failure::Permanent, error).await
    }
}

impl<Q: TaskQueue> Drop for LeasedTask<Q> {
    fn drop(&mut self) {
        if !self.resolved {
            panic!("leased task must be acked, failed or skipped before it is dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fabric_broker::MemoryBroker;
    use fabric_queue::Payload;
    use fabric_queue::QueueConfig;
    use fabric_queue::Task;

    use super::*;

    fn manager() -> QueueManager<String> {
        QueueManager::new(Arc::new(MemoryBroker::new()), QueueConfig::default())
    }

    fn payload() -> Payload {
        Payload {
            request: "summarize".to_string(),
            file: None,
            priority: Default::default(),
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    #[test]
    #[should_panic(expected = "leased task must be acked, failed or skipped before it is dropped")]
    fn unresolved_task_panics_on_drop() {
        let task = Task::new("llm-default", payload());
        let _leased = LeasedTask::new(task, "llm-default".to_string());
    }

    #[tokio::test]
    async fn success_resolves_without_panicking() {
        let ctx = Context::fixture();
        let manager = manager();
        let task = manager.enqueue(&ctx, &"llm-default".to_string(), Task::new("llm-default", payload())).await.unwrap();
        let leased_task = manager.lease(&ctx, &"llm-default".to_string()).await.unwrap().unwrap();
        let leased = LeasedTask::new(leased_task, "llm-default".to_string());
        assert!(leased.success(&ctx, &manager).await.unwrap());
        let _ = task;
    }
}
