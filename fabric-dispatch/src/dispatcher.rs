//! Ties classification, scoring, and a selection strategy together into one dispatch call
//! (spec.md §4.7 "Selection").
use std::collections::BTreeSet;
use std::sync::Arc;

use fabric_context::Context;
use fabric_queue::QueueManager;
use fabric_queue::Task;
use fabric_registry::Registry;
use fabric_registry::Worker;

use crate::classify;
use crate::classify::Category;
use crate::classify::ComplexityTier;
use crate::score;
use crate::score::Candidate;
use crate::score::ScoringContext;
use crate::score::SelectionHints;
use crate::strategy;
use crate::strategy::SelectionStrategy;

/// No worker currently registered can satisfy the task's requirements (spec.md §4.7
/// "Deregistration migration": "unreachable items ... are DLQ'd with reason
/// `no_available_target`").
#[derive(Debug, thiserror::Error)]
#[error("no eligible worker is available for this task")]
pub struct NoAvailableTarget;

/// The classification and scoring outcome for one task, useful to callers that want to log or
/// audit a dispatch decision.
pub struct DispatchDecision {
    pub category: Category,
    pub complexity: ComplexityTier,
    pub required_capabilities: BTreeSet<String>,
    pub chosen_worker: String,
    pub score: f64,
}

/// Outcome of one [`Dispatcher::migrate_on_deregister`] call.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct DeregisterMigration {
    /// Tasks successfully re-dispatched to another worker.
    pub migrated: usize,
    /// Tasks DLQ'd with `no_available_target` because no eligible worker remained.
    pub dead_lettered: usize,
}

/// Classifies and routes tasks to worker home queues (`queue:<workerId>`).
pub struct Dispatcher {
    registry: Arc<Registry>,
    queue_manager: Arc<QueueManager<String>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, queue_manager: Arc<QueueManager<String>>) -> Dispatcher {
        Dispatcher { registry, queue_manager }
    }

    /// Classify, score every eligible worker, pick one with `strategy`, and enqueue the task onto
    /// that worker's home queue.
    pub async fn dispatch(
        &self,
        ctx: &Context,
        task: Task,
        strategy: SelectionStrategy,
        hints: SelectionHints,
        success_rates: &std::collections::HashMap<String, f64>,
    ) -> Result<DispatchDecision, NoAvailableTarget> {
        let category = classify::classify_category(&task.payload.request);
        let complexity = classify::classify_complexity(&task.payload, None);
        let required_capabilities = classify::required_capabilities(&task.payload, category, complexity);

        let workers = self.registry.list().await.unwrap_or_default();
        let target_zone = task.payload.preferred_zone.as_deref();
        let eligible: Vec<&Worker> = workers
            .iter()
            .filter(|worker| {
                !self.registry.is_stale(worker)
                    && score::is_eligible(
                        worker,
                        &ScoringContext {
                            required_capabilities: &required_capabilities,
                            target_zone,
                            success_rate: 0.0,
                            cost_per_unit: None,
                            hints,
                        },
                    )
            })
            .collect();

        if eligible.is_empty() {
            return Err(NoAvailableTarget);
        }

        let candidates: Vec<Candidate> = eligible
            .iter()
            .map(|worker| {
                let success_rate = success_rates.get(&worker.worker_id).copied().unwrap_or(0.8);
                let ctx = ScoringContext {
                    required_capabilities: &required_capabilities,
                    target_zone,
                    success_rate,
                    cost_per_unit: None,
                    hints,
                };
                Candidate {
                    worker,
                    score: score::selection_score(worker, &ctx),
                }
            })
            .collect();

        let chosen = strategy::select(strategy, &candidates, &task.fingerprint).ok_or(NoAvailableTarget)?;
        let chosen_score = candidates
            .iter()
            .find(|candidate| candidate.worker.worker_id == chosen.worker_id)
            .map(|candidate| candidate.score)
            .unwrap_or(0.0);
        let worker_id = chosen.worker_id.clone();

        self.queue_manager
            .enqueue(ctx, &worker_id, task)
            .await
            .map_err(|_| NoAvailableTarget)?;

        Ok(DispatchDecision {
            category,
            complexity,
            required_capabilities,
            chosen_worker: worker_id,
            score: chosen_score,
        })
    }

    /// Drain a departing worker's queued and in-flight tasks and re-dispatch each to the best
    /// remaining eligible worker, DLQ'ing with reason `no_available_target` whatever can't be
    /// placed (spec.md §4.7 "Deregistration migration"). Call this before the worker is removed
    /// from the registry, so `departing_worker_id` is still excluded from eligibility explicitly
    /// rather than relying on it having already vanished from `Registry::list`.
    pub async fn migrate_on_deregister(&self, ctx: &Context, departing_worker_id: &str) -> DeregisterMigration {
        let queue = departing_worker_id.to_string();
        let mut stranded = self.queue_manager.drain_processing(ctx, &queue).await.unwrap_or_default();
        stranded.extend(self.queue_manager.drain_queue(ctx, &queue).await.unwrap_or_default());

        let mut summary = DeregisterMigration::default();
        for mut task in stranded {
            task.migrated_from = Some(departing_worker_id.to_string());
            let target = self.retarget(departing_worker_id, &task).await;
            let placed = match target {
                Some(worker_id) => self.queue_manager.enqueue(ctx, &worker_id, task.clone()).await.is_ok(),
                None => false,
            };
            if placed {
                summary.migrated += 1;
            } else {
                let _ = self.queue_manager.dlq_direct(ctx, &queue, task, "no_available_target").await;
                summary.dead_lettered += 1;
            }
        }

        slog::info!(
            ctx.logger, "Migrated departing worker's tasks";
            "worker" => departing_worker_id,
            "migrated" => summary.migrated, "dead_lettered" => summary.dead_lettered,
        );
        summary
    }

    /// Classify `task` and score every eligible worker other than `exclude`, returning the best
    /// one if any qualifies.
    async fn retarget(&self, exclude: &str, task: &Task) -> Option<String> {
        let category = classify::classify_category(&task.payload.request);
        let complexity = classify::classify_complexity(&task.payload, None);
        let required_capabilities = classify::required_capabilities(&task.payload, category, complexity);
        let target_zone = task.payload.preferred_zone.as_deref();

        let workers = self.registry.list().await.unwrap_or_default();
        let eligible: Vec<&Worker> = workers
            .iter()
            .filter(|worker| {
                worker.worker_id != exclude
                    && !self.registry.is_stale(worker)
                    && score::is_eligible(
                        worker,
                        &ScoringContext {
                            required_capabilities: &required_capabilities,
                            target_zone,
                            success_rate: 0.0,
                            cost_per_unit: None,
                            hints: SelectionHints::default(),
                        },
                    )
            })
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let candidates: Vec<Candidate> = eligible
            .iter()
            .map(|worker| {
                let ctx = ScoringContext {
                    required_capabilities: &required_capabilities,
                    target_zone,
                    success_rate: 0.8,
                    cost_per_unit: None,
                    hints: SelectionHints::default(),
                };
                Candidate {
                    worker,
                    score: score::selection_score(worker, &ctx),
                }
            })
            .collect();
        strategy::select(SelectionStrategy::TopScore, &candidates, &task.fingerprint).map(|worker| worker.worker_id.clone())
    }
}
