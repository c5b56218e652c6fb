//! The Queue Manager: per-queue enqueue / reliable lease / ack / requeue / DLQ (spec.md §4.2).
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fabric_broker::BrokerClient;
use fabric_context::Context;
use serde_json::json;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::config::TaskQueue;
use crate::error::DlqRetryRejected;
use crate::error::MalformedTask;
use crate::error::QueueError;
use crate::error::Result;
use crate::task::Task;

/// Classification of a failed attempt, mirroring the Executor error taxonomy of spec.md §7.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Failure {
    /// Safe to retry: requeue unless `maxAttempts` is reached.
    Transient,
    /// Never retry: move straight to the DLQ.
    Permanent,
}

/// What happened to a task as a result of [`QueueManager::nack`].
#[derive(Clone, Debug)]
pub enum NackOutcome {
    Requeued(Task),
    DeadLettered(Task),
}

/// Per-queue enqueue / lease / ack / requeue / DLQ manager, backed by a [`BrokerClient`].
///
/// One `QueueManager` instance is shared (behind an `Arc`) by every queue name of type `Q`; the
/// queue name is threaded through each call rather than baked into the manager, matching the
/// teacher's `TasksBackend` (one backend, many queues) rather than one manager per queue.
pub struct QueueManager<Q: TaskQueue> {
    broker: Arc<dyn BrokerClient>,
    config: QueueConfig,
    _queue: PhantomData<Q>,
}

impl<Q: TaskQueue> QueueManager<Q> {
    pub fn new(broker: Arc<dyn BrokerClient>, config: QueueConfig) -> QueueManager<Q> {
        QueueManager {
            broker,
            config,
            _queue: PhantomData,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn queue_key(queue: &Q) -> String {
        format!("queue:{}", queue.name())
    }

    fn processing_key(queue: &Q) -> String {
        format!("processing:{}", queue.name())
    }

    fn dlq_key(queue: &Q) -> String {
        format!("dlq:{}", queue.name())
    }

    fn txlog_key(queue: &Q) -> String {
        format!("txlog:{}", queue.name())
    }

    fn dampener_key(queue: &Q, task_id: Uuid) -> String {
        format!("dlq_retry_dampener:{}:{}", queue.name(), task_id)
    }

    /// Append a transaction log entry, trimmed to [`QueueConfig::txlog_capacity`]
    /// (spec.md §4.2 "writes `task_enqueued` txlog entry").
    async fn record_event(&self, ctx: &Context, queue: &Q, event: &str, task: &Task) -> Result<()> {
        let entry = json!({
            "event": event,
            "task_id": task.id,
            "queue": task.queue,
            "attempts": task.attempts,
            "ts": Utc::now().to_rfc3339(),
            "error": task.last_error,
            "error_kind": task.last_error_kind,
        })
        .to_string();
        let score = Utc::now().timestamp_millis();
        let log = Self::txlog_key(queue);
        self.broker.sorted_set_add(&log, score, &entry).await?;
        self.broker
            .sorted_set_trim(&log, self.config.txlog_capacity)
            .await?;
        slog::debug!(ctx.logger, "Recorded queue event"; "event" => event, "task" => %task.id);
        Ok(())
    }

    /// Append a task to the tail of its home queue (spec.md `EnqueueTail`).
    pub async fn enqueue(&self, ctx: &Context, queue: &Q, task: Task) -> Result<Task> {
        let blob = serde_json::to_value(&task)?;
        self.broker.enqueue_tail(&Self::queue_key(queue), blob).await?;
        self.record_event(ctx, queue, "task_enqueued", &task).await?;
        slog::info!(ctx.logger, "Task enqueued"; "task" => %task.id, "queue" => %queue.name());
        Ok(task)
    }

    /// Atomically move the head of `queue:Q` into `processing:Q`, stamping `start_time`
    /// (spec.md `LeaseHead` + "Lease").
    pub async fn lease(&self, ctx: &Context, queue: &Q) -> Result<Option<Task>> {
        let leased = self
            .broker
            .lease_head(&Self::queue_key(queue), &Self::processing_key(queue))
            .await?;
        let Some(blob) = leased else {
            return Ok(None);
        };
        let mut task: Task = match serde_json::from_value(blob.clone()) {
            Ok(task) => task,
            Err(error) => {
                // Malformed payload: DLQ it straight out of processing rather than leaving a
                // task nobody can deserialize stuck forever (spec.md step 3, "Validate task; if
                // malformed -> ack-and-DLQ with permanent error"). No id is recoverable from an
                // undeserializable blob, so the DLQ'd error carries a nil placeholder.
                self.broker
                    .push_dlq(&Self::processing_key(queue), &Self::dlq_key(queue), &blob)
                    .await?;
                return Err(QueueError::Malformed(MalformedTask(
                    Uuid::nil(),
                    error.to_string(),
                )));
            }
        };
        task.start_time = Some(Utc::now());
        let meta_key = format!("{}:meta", Self::processing_key(queue));
        self.broker
            .hash_set(&meta_key, &task.id.to_string(), &serde_json::to_string(&task)?)
            .await?;
        slog::debug!(ctx.logger, "Task leased"; "task" => %task.id, "queue" => %queue.name());
        Ok(Some(task))
    }

    /// Remove one occurrence of `task` from `processing:Q` (spec.md `AckFromProcessing`).
    /// Best-effort: a missing match (duplicate ack after recovery) is not an error.
    pub async fn ack(&self, ctx: &Context, queue: &Q, task: &Task) -> Result<bool> {
        let blob = serde_json::to_value(task)?;
        let found = self
            .broker
            .ack_from_processing(&Self::processing_key(queue), &blob)
            .await?;
        self.clear_meta(queue, task.id).await?;
        if found {
            self.record_event(ctx, queue, "task_completed", task).await?;
            slog::info!(ctx.logger, "Task acked"; "task" => %task.id, "queue" => %queue.name());
        } else {
            slog::debug!(ctx.logger, "Duplicate ack swallowed"; "task" => %task.id);
        }
        Ok(found)
    }

    async fn clear_meta(&self, queue: &Q, task_id: Uuid) -> Result<()> {
        let meta_key = format!("{}:meta", Self::processing_key(queue));
        self.broker.hash_del(&meta_key, &task_id.to_string()).await?;
        Ok(())
    }

    /// Record a failed attempt: requeue with incremented `attempts` unless the error is
    /// permanent or `maxAttempts` is reached, in which case move to the DLQ (spec.md
    /// "Nack/Requeue", "DLQ").
    pub async fn nack(
        &self,
        ctx: &Context,
        queue: &Q,
        mut task: Task,
        failure: Failure,
        error: impl Into<String>,
    ) -> Result<NackOutcome> {
        let blob = serde_json::to_value(&task)?;
        task.attempts += 1;
        task.last_error = Some(error.into());
        task.last_error_kind = Some(match failure {
            Failure::Transient => "transient",
            Failure::Permanent => "permanent",
        }.to_string());
        self.clear_meta(queue, task.id).await?;

        let exhausted = task.attempts >= self.config.max_attempts;
        if failure == Failure::Permanent || exhausted {
            self.broker
                .push_dlq(&Self::processing_key(queue), &Self::dlq_key(queue), &blob)
                .await?;
            self.record_event(ctx, queue, "task_failed", &task).await?;
            slog::warn!(
                ctx.logger, "Task moved to DLQ";
                "task" => %task.id, "queue" => %queue.name(),
                "attempts" => task.attempts, "permanent" => failure == Failure::Permanent,
            );
            return Ok(NackOutcome::DeadLettered(task));
        }

        self.broker
            .requeue_from_processing(&Self::processing_key(queue), &Self::queue_key(queue), &blob)
            .await?;
        // `requeue_from_processing` moved the pre-nack blob onto the queue head; replace it
        // in place with the attempts-incremented version so the next lessee sees the updated
        // record.
        self.broker.list_remove(&Self::queue_key(queue), &blob).await.ok();
        let updated_blob = serde_json::to_value(&task)?;
        self.push_front(queue, updated_blob).await?;
        self.record_event(ctx, queue, "task_requeued", &task).await?;
        slog::info!(
            ctx.logger, "Task requeued after failure";
            "task" => %task.id, "queue" => %queue.name(), "attempts" => task.attempts,
        );
        Ok(NackOutcome::Requeued(task))
    }

    /// Number of tasks currently pending in `queue:Q`.
    pub async fn queue_depth(&self, queue: &Q) -> Result<usize> {
        Ok(self.broker.list_len(&Self::queue_key(queue)).await?)
    }

    /// Number of tasks currently leased in `processing:Q`.
    pub async fn processing_depth(&self, queue: &Q) -> Result<usize> {
        Ok(self.broker.list_len(&Self::processing_key(queue)).await?)
    }

    /// Number of tasks currently dead-lettered in `dlq:Q`.
    pub async fn dlq_depth(&self, queue: &Q) -> Result<usize> {
        Ok(self.broker.list_len(&Self::dlq_key(queue)).await?)
    }

    /// Tasks in `processing:Q` whose `start_time` is older than `stuckThreshold`
    /// (spec.md "Stuck-task detection").
    pub async fn stuck_tasks(&self, queue: &Q) -> Result<Vec<Task>> {
        let processing = self.broker.list_peek(&Self::processing_key(queue), usize::MAX).await?;
        let threshold = self.config.stuck_threshold();
        let now = Utc::now();
        let mut stuck = Vec::new();
        for blob in processing {
            let Ok(task) = serde_json::from_value::<Task>(blob) else {
                continue;
            };
            if let Some(start_time) = task.start_time {
                let age = now.signed_duration_since(start_time);
                if age.to_std().unwrap_or(Duration::ZERO) > threshold {
                    stuck.push(task);
                }
            }
        }
        Ok(stuck)
    }

    /// Requeue a stuck task to the head of `queue:Q` with `previouslyStuck=true` and
    /// incremented `attempts` (spec.md §4.7 corrective action table).
    pub async fn recover_stuck(&self, ctx: &Context, queue: &Q, mut task: Task) -> Result<Task> {
        let blob = serde_json::to_value(&task)?;
        self.broker
            .ack_from_processing(&Self::processing_key(queue), &blob)
            .await?;
        self.clear_meta(queue, task.id).await?;
        task.attempts += 1;
        task.previously_stuck = true;
        task.start_time = None;
        let recovered = serde_json::to_value(&task)?;
        self.broker
            .list_remove(&Self::queue_key(queue), &recovered)
            .await
            .ok();
        // Requeue to head: a plain enqueue would land at the tail, but recovered tasks raise
        // priority by cutting the line (spec.md "requeue each stuck task to head").
        self.push_front(queue, recovered).await?;
        self.record_event(ctx, queue, "task_stuck_recovered", &task).await?;
        slog::warn!(ctx.logger, "Recovered stuck task"; "task" => %task.id, "queue" => %queue.name());
        Ok(task)
    }

    async fn push_front(&self, queue: &Q, blob: serde_json::Value) -> Result<()> {
        // The broker's list primitives expose tail-enqueue and head-requeue; a dedicated
        // processing list name of "-" never collides with a real queue/DLQ/processing key, so
        // requeue-from-processing can be reused purely for its "push to head" side effect.
        let scratch = format!("-:recover:{}", queue.name());
        self.broker.enqueue_tail(&scratch, blob.clone()).await?;
        self.broker
            .requeue_from_processing(&scratch, &Self::queue_key(queue), &blob)
            .await?;
        Ok(())
    }

    /// Move a dead-lettered task back onto the main queue, subject to the 5-minute dampener and
    /// the `maxDlqRetries` hard cap (spec.md §4.7 "DLQ retry", §9).
    pub async fn retry_from_dlq(&self, ctx: &Context, queue: &Q, mut task: Task) -> Result<Task> {
        if task.dlq_retries >= self.config.max_dlq_retries {
            return Err(QueueError::DlqRetryRejected(DlqRetryRejected::CapExceeded(
                task.id,
                self.config.max_dlq_retries,
            )));
        }
        let claimed = self
            .broker
            .kv_set_if_absent(
                &Self::dampener_key(queue, task.id),
                "1",
                self.config.dlq_retry_dampener(),
            )
            .await?;
        if !claimed {
            return Err(QueueError::DlqRetryRejected(DlqRetryRejected::Dampened(task.id)));
        }

        let blob = serde_json::to_value(&task)?;
        self.broker.list_remove(&Self::dlq_key(queue), &blob).await?;
        task.retried_from_dlq = true;
        task.dlq_retries += 1;
        task.last_error = None;
        task.last_error_kind = None;
        let retried = serde_json::to_value(&task)?;
        self.push_front(queue, retried).await?;
        self.record_event(ctx, queue, "task_retried_from_dlq", &task).await?;
        slog::info!(ctx.logger, "Retried task from DLQ"; "task" => %task.id, "queue" => %queue.name());
        Ok(task)
    }

    /// Return a leased task to the head of `queue:Q` unchanged: no incremented `attempts`, no
    /// `previouslyStuck` flag (spec.md §7 `CircuitOpen` row: "Return task to queue without
    /// consuming attempts"). Used when a circuit breaker trip prevents the Executor from even
    /// being invoked, so the failure was never the task's fault.
    pub async fn requeue_unchanged(&self, ctx: &Context, queue: &Q, task: Task) -> Result<Task> {
        let blob = serde_json::to_value(&task)?;
        self.broker
            .ack_from_processing(&Self::processing_key(queue), &blob)
            .await?;
        self.clear_meta(queue, task.id).await?;
        self.push_front(queue, blob).await?;
        self.record_event(ctx, queue, "task_circuit_open_requeued", &task).await?;
        slog::warn!(ctx.logger, "Requeued task unchanged after circuit trip"; "task" => %task.id, "queue" => %queue.name());
        Ok(task)
    }

    /// Drain every task currently pending in `queue:Q`, removing them from the queue entirely
    /// (spec.md §4.7 "Deregistration migration": a departing worker's queued items are pulled
    /// off before being re-dispatched elsewhere). Reuses `lease`+`ack` purely for their atomic
    /// pop side effect, the same idiom [`crate`]'s Balancer uses to pull a single task.
    pub async fn drain_queue(&self, ctx: &Context, queue: &Q) -> Result<Vec<Task>> {
        let mut drained = Vec::new();
        loop {
            match self.lease(ctx, queue).await {
                Ok(Some(task)) => {
                    self.ack(ctx, queue, &task).await?;
                    drained.push(task);
                }
                Ok(None) => break,
                Err(QueueError::Malformed(_)) => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(drained)
    }

    /// Drain every task currently leased in `processing:Q` (spec.md §4.7 "Deregistration
    /// migration": a departing worker's in-flight items are stranded in `processing` with no
    /// loop left to ack them, so they must be pulled out directly rather than via `lease`).
    pub async fn drain_processing(&self, ctx: &Context, queue: &Q) -> Result<Vec<Task>> {
        let blobs = self.broker.list_peek(&Self::processing_key(queue), usize::MAX).await?;
        let mut drained = Vec::new();
        for blob in blobs {
            let Ok(task) = serde_json::from_value::<Task>(blob.clone()) else {
                continue;
            };
            self.broker.ack_from_processing(&Self::processing_key(queue), &blob).await?;
            self.clear_meta(queue, task.id).await?;
            self.record_event(ctx, queue, "task_drained_from_processing", &task).await?;
            drained.push(task);
        }
        Ok(drained)
    }

    /// Move a task straight to `dlq:Q`, bypassing `processing:Q` entirely (spec.md §4.7
    /// "Deregistration migration": "unreachable items ... are DLQ'd with reason
    /// `no_available_target`"). Unlike [`QueueManager::nack`], the task need not currently be
    /// leased: a task drained off a departing worker by [`QueueManager::drain_queue`] or
    /// [`QueueManager::drain_processing`] is already out of every broker list by the time it
    /// reaches here.
    pub async fn dlq_direct(&self, ctx: &Context, queue: &Q, mut task: Task, reason: impl Into<String>) -> Result<Task> {
        task.last_error = Some(reason.into());
        task.last_error_kind = Some("permanent".to_string());
        let blob = serde_json::to_value(&task)?;
        self.broker
            .push_dlq(&Self::processing_key(queue), &Self::dlq_key(queue), &blob)
            .await?;
        self.record_event(ctx, queue, "task_failed", &task).await?;
        slog::warn!(
            ctx.logger, "Task moved directly to DLQ";
            "task" => %task.id, "queue" => %queue.name(), "reason" => task.last_error.as_deref().unwrap_or(""),
        );
        Ok(task)
    }

    /// Peek, without removing, up to `limit` entries at the head of the DLQ (used by the Health
    /// Monitor's DLQ scan, spec.md §4.7).
    pub async fn dlq_peek(&self, queue: &Q, limit: usize) -> Result<Vec<Task>> {
        let blobs = self.broker.list_peek(&Self::dlq_key(queue), limit).await?;
        Ok(blobs
            .into_iter()
            .filter_map(|blob| serde_json::from_value(blob).ok())
            .collect())
    }

    /// Transaction log entries for `queue:Q` newer than `window` ago, used by the Health Monitor
    /// to compute `failureRate` and bucket errors by category over a trailing window (spec.md
    /// §4.8). The txlog is already bounded to [`QueueConfig::txlog_capacity`], so reading it in
    /// full and filtering in memory is cheap.
    pub async fn recent_events(&self, queue: &Q, window: Duration) -> Result<Vec<crate::task::TxlogEvent>> {
        let log = Self::txlog_key(queue);
        let raw = self.broker.sorted_set_range(&log, usize::MAX).await?;
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        let mut events = Vec::new();
        for entry in raw {
            if let Ok(event) = serde_json::from_str::<crate::task::TxlogEvent>(&entry.member) {
                if event.ts >= cutoff {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    /// Current size of `txlog:Q` (spec.md "Bounded txlog" invariant).
    pub async fn txlog_len(&self, queue: &Q) -> Result<usize> {
        Ok(self.broker.sorted_set_len(&Self::txlog_key(queue)).await?)
    }
}
