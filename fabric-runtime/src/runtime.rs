//! The per-worker task loop: `Start()`/`Stop()` plus the fetch-dispatch-join cycle (spec.md
//! §4.6), grounded on `core/tasks/src/execute/executor.rs`'s `TasksExecutor::execute_inner`.
use std::sync::Arc;
use std::time::Duration;

use fabric_context::Context;
use fabric_dispatch::Dispatcher;
use fabric_locks::Claim;
use fabric_locks::ConflictContext;
use fabric_locks::LockManager;
use fabric_locks::Resolution;
use fabric_queue::Priority;
use fabric_queue::QueueManager;
use fabric_queue::Task;
use fabric_queue::TaskQueue;
use fabric_registry::Registry;
use fabric_registry::Worker;
use fabric_registry::WorkerState;
use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use tokio::sync::watch;
use tokio::sync::Mutex as AsyncMutex;

use crate::backoff::Backoff;
use crate::breaker::CircuitBreaker;
use crate::config::RuntimeConfig;
use crate::executor::Executor;
use crate::leased::LeasedTask;
use crate::ratelimit::RateLimiter;

/// Handle returned by [`WorkerRuntime::start`]; `stop()` signals the loop and waits for it to
/// drain (spec.md `Stop()`).
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
    drain_timeout: Duration,
}

impl RuntimeHandle {
    /// Stop accepting new leases, wait up to `drainTimeout` for in-flight tasks to finish, then
    /// return once the loop has exited (spec.md `Stop()`).
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = tokio::time::timeout(self.drain_timeout, self.join).await;
    }
}

/// Drives one worker's task loop against a single home queue.
pub struct WorkerRuntime<Q: TaskQueue, E: Executor> {
    queue: Q,
    worker_id: String,
    queue_manager: Arc<QueueManager<Q>>,
    locks: Arc<LockManager>,
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<E>,
    config: RuntimeConfig,
}

impl<Q: TaskQueue, E: Executor + 'static> WorkerRuntime<Q, E> {
    pub fn new(
        queue: Q,
        worker_id: impl Into<String>,
        queue_manager: Arc<QueueManager<Q>>,
        locks: Arc<LockManager>,
        registry: Arc<Registry>,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<E>,
        config: RuntimeConfig,
    ) -> WorkerRuntime<Q, E> {
        WorkerRuntime {
            queue,
            worker_id: worker_id.into(),
            queue_manager,
            locks,
            registry,
            dispatcher,
            executor,
            config,
        }
    }

    /// Register the worker and spawn the task loop (spec.md `Start()`).
    pub async fn start(self: Arc<Self>, ctx: Context, worker: Worker) -> fabric_registry::Result<RuntimeHandle> {
        self.registry.register(&ctx, worker).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let drain_timeout = self.config.drain_timeout;
        let runtime = self.clone();
        let join = tokio::spawn(async move { runtime.run(ctx, shutdown_rx).await });
        Ok(RuntimeHandle {
            shutdown: shutdown_tx,
            join,
            drain_timeout,
        })
    }

    /// The fetch-dispatch-join loop (spec.md steps 1-9).
    async fn run(self: Arc<Self>, ctx: Context, mut shutdown_rx: watch::Receiver<bool>) {
        let breaker = Arc::new(AsyncMutex::new(CircuitBreaker::new(
            self.config.breaker_failure_threshold,
            self.config.breaker_window,
            self.config.breaker_reset_after,
        )));
        let limiter = Arc::new(AsyncMutex::new(RateLimiter::new(self.config.rate_limit_per_minute)));
        let mut loop_backoff = Backoff::new(
            self.config.backoff_start,
            self.config.backoff_max,
            self.config.backoff_multiplier,
            self.config.backoff_max_retries,
        );
        let mut pool: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();

        loop {
            let accepting = !*shutdown_rx.borrow();
            let has_capacity = pool.len() < self.config.max_concurrency;

            tokio::select! {
                _ = shutdown_rx.changed(), if accepting => continue,

                _ = tokio::time::sleep(self.config.capacity_poll), if !has_capacity || !accepting => {
                    if !accepting && pool.is_empty() {
                        break;
                    }
                }

                leased = self.lease_one(&ctx), if has_capacity && accepting => {
                    match leased {
                        Ok(Some(task)) => {
                            if let Some(wait) = limiter.lock().await.wait_for() {
                                tokio::time::sleep(wait).await;
                            }
                            limiter.lock().await.record_call();
                            let runtime = self.clone();
                            let ctx = ctx.clone();
                            let breaker = breaker.clone();
                            let handle = tokio::spawn(async move {
                                runtime.dispatch(ctx, task, breaker).await;
                            });
                            pool.push(handle);
                        }
                        Ok(None) => tokio::time::sleep(self.config.empty_queue_poll).await,
                        Err(error) => {
                            slog::warn!(ctx.logger, "Failed to lease task"; "error" => %error);
                            if loop_backoff.retry(&ctx, &error.to_string()).await.is_err() {
                                slog::error!(ctx.logger, "Giving up after repeated lease failures");
                            }
                        }
                    }
                }

                result = pool.next(), if !pool.is_empty() => {
                    if let Some(Err(error)) = result {
                        if error.is_panic() {
                            slog::error!(ctx.logger, "Task execution panicked"; "error" => %error);
                        }
                    } else {
                        loop_backoff.success();
                    }
                    if !accepting && pool.is_empty() {
                        break;
                    }
                }
            }
        }

        slog::info!(ctx.logger, "Worker task loop exited"; "worker" => %self.worker_id);
    }

    async fn lease_one(&self, ctx: &Context) -> fabric_queue::Result<Option<Task>> {
        match self.queue_manager.lease(ctx, &self.queue).await {
            Ok(task) => Ok(task),
            Err(fabric_queue::QueueError::Malformed(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Steps 5-9: acquire locks, invoke the Executor under a deadline, resolve the task.
    async fn dispatch(&self, ctx: Context, task: Task, breaker: Arc<AsyncMutex<CircuitBreaker>>) {
        let leased = LeasedTask::new(task, self.queue.clone());

        let lock_resource = leased.task().payload.file.clone();
        let claim = match &lock_resource {
            Some(resource) => match self.locks.claim(&ctx, resource, &self.worker_id).await {
                Ok(claim) => Some(claim),
                Err(_) => match self.resolve_lock_conflict(&ctx, resource, leased.task()).await {
                    Some(claim) => Some(claim),
                    None => {
                        let _ = leased.fail(&ctx, &self.queue_manager, "coordination request denied").await;
                        return;
                    }
                },
            },
            None => None,
        };

        if !breaker.lock().await.allow() {
            let task = leased.into_inner_unresolved();
            let _ = self.queue_manager.requeue_unchanged(&ctx, &self.queue, task).await;
            if let Some(claim) = claim {
                let _ = claim.release().await;
            }
            return;
        }

        let deadline = leased
            .task()
            .deadline_at
            .map(|at| (at - chrono::Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(self.config.default_deadline);
        let outcome = tokio::time::timeout(deadline, self.executor.execute(&ctx, leased.task())).await;

        match outcome {
            Ok(Ok(_result)) => {
                breaker.lock().await.record_success();
                let _ = leased.success(&ctx, &self.queue_manager).await;
            }
            Ok(Err(error)) if error.is_retryable() => {
                breaker.lock().await.record_failure();
                let reason = error.reason().to_string();
                self.backoff_before_requeue(&ctx, leased.task().attempts).await;
                let _ = leased.fail(&ctx, &self.queue_manager, reason).await;
            }
            Ok(Err(error)) => {
                let _ = leased.skip(&ctx, &self.queue_manager, error.reason().to_string()).await;
            }
            Err(_elapsed) => {
                breaker.lock().await.record_failure();
                self.backoff_before_requeue(&ctx, leased.task().attempts).await;
                let _ = leased.fail(&ctx, &self.queue_manager, "task deadline expired").await;
            }
        }

        if let Some(claim) = claim {
            let _ = claim.release().await;
        }
    }

    /// Sleep the jittered per-task backoff before a transiently-failed task is requeued, so a
    /// retryable or rate-limited Executor error does not spin into a hot retry loop (spec.md
    /// §4.6 step 8, §8 scenario 3).
    async fn backoff_before_requeue(&self, ctx: &Context, attempt: u16) {
        let delay = Backoff::delay_for_attempt(
            self.config.backoff_start,
            self.config.backoff_max,
            self.config.backoff_multiplier,
            attempt,
        );
        slog::debug!(ctx.logger, "Backing off before requeue"; "attempt" => attempt, "delay_ms" => delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    }

    /// Resolve a claim conflict against the Conflict Arbiter's policy table and actually enforce
    /// the outcome, rather than proceeding lock-less (spec.md §4.4): `Override` force-locks
    /// `resource` to this worker; `Coordinate` only proceeds once the current holder's spare
    /// capacity has been checked and it has actually released the resource; `Wait` (or any
    /// resolution the policy call itself failed to reach) never yields a claim.
    async fn resolve_lock_conflict(&self, ctx: &Context, resource: &str, task: &Task) -> Option<Claim> {
        let owner = self.locks.current_owner(resource).await.ok().flatten();
        let owner_worker = match &owner {
            Some(owner_id) => self.registry.get(owner_id).await.ok(),
            None => None,
        };
        let requester_worker = self.registry.get(&self.worker_id).await.ok();
        let capability_overlap = match (&requester_worker, &owner_worker) {
            (Some(requester), Some(owner)) => requester.capabilities.intersection(&owner.capabilities).next().is_some(),
            _ => false,
        };

        let policy_ctx = ConflictContext {
            capability_overlap,
            resource_is_critical: self.config.critical_resources.contains(resource),
            request_is_high_priority: task.payload.priority == Priority::Critical,
            owner_registered: owner_worker.is_some(),
            wait_timeout: self.config.lock_wait_timeout,
        };
        let resolution = self
            .locks
            .resolve_conflict(ctx, resource, &self.worker_id, &task.id.to_string(), &policy_ctx)
            .await
            .ok()?;

        match resolution {
            Resolution::Override { .. } => self.locks.force_claim(ctx, resource, &self.worker_id).await.ok(),
            Resolution::Coordinate => {
                let has_capacity = owner_worker
                    .as_ref()
                    .map(|owner| owner.current_load < owner.max_concurrency)
                    .unwrap_or(true);
                if !has_capacity {
                    return None;
                }
                self.locks.wait_for_release(resource, self.config.lock_wait_timeout).await.ok()?;
                self.locks.claim(ctx, resource, &self.worker_id).await.ok()
            }
            Resolution::Wait { .. } => None,
        }
    }

    /// Stop accepting leases, begin graceful shutdown in the registry (spec.md `Stop()` step 1).
    pub async fn begin_shutdown(&self, ctx: &Context, worker: Worker) -> fabric_registry::Result<Worker> {
        self.registry.begin_shutdown(ctx, worker).await
    }

    /// Deregister once drained (spec.md `Stop()` step 3). Migrates whatever is still queued or
    /// in-flight on this worker's home queue to another eligible worker before the record is
    /// removed, DLQ'ing with `no_available_target` whatever can't be placed (spec.md §4.7
    /// "Deregistration migration") — without this, tasks left behind by a departing worker would
    /// be stranded forever.
    pub async fn finish_shutdown(&self, ctx: &Context, mut worker: Worker) -> fabric_registry::Result<()> {
        let migration = self.dispatcher.migrate_on_deregister(ctx, &self.worker_id).await;
        slog::info!(
            ctx.logger, "Migrated tasks ahead of deregistration";
            "worker" => %self.worker_id, "migrated" => migration.migrated, "dead_lettered" => migration.dead_lettered,
        );
        worker.state = WorkerState::ShuttingDown;
        self.registry.deregister(ctx, worker).await
    }
}
