//! Periodic load balancing between worker home queues (spec.md §4.7 "Balancing").
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use fabric_context::Context;
use fabric_queue::QueueManager;
use fabric_registry::Registry;
use fabric_registry::Worker;

use crate::score;
use crate::score::Candidate;
use crate::score::ScoringContext;
use crate::score::SelectionHints;
use crate::strategy;
use crate::strategy::SelectionStrategy;

const OVERLOADED_THRESHOLD: f64 = 0.7;
const UNDERLOADED_THRESHOLD: f64 = 0.5;
const EMERGENCY_THRESHOLD: f64 = 0.9;

/// Tunables for [`Balancer::run_cycle`] (spec.md §4.7 "Balancing").
pub struct BalancerConfig {
    /// Minimum time between cycles, bypassed for an emergency rebalance.
    pub min_cycle_interval: Duration,
    /// Max tasks migrated away from a single overloaded worker per cycle (`K`).
    pub per_worker_cap: usize,
    /// Max tasks migrated across all workers per cycle.
    pub per_cycle_cap: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        BalancerConfig {
            min_cycle_interval: Duration::from_secs(30),
            per_worker_cap: 5,
            per_cycle_cap: 10,
        }
    }
}

/// One task moved from an overloaded worker's queue to an underloaded one.
#[derive(Debug)]
pub struct Migration {
    pub from_worker: String,
    pub to_worker: String,
}

/// Drives periodic rebalancing across registered workers' home queues.
pub struct Balancer {
    registry: Arc<Registry>,
    queue_manager: Arc<QueueManager<String>>,
    config: BalancerConfig,
    last_cycle: Option<Instant>,
}

impl Balancer {
    pub fn new(registry: Arc<Registry>, queue_manager: Arc<QueueManager<String>>, config: BalancerConfig) -> Balancer {
        Balancer {
            registry,
            queue_manager,
            config,
            last_cycle: None,
        }
    }

    fn overloaded(worker: &Worker) -> bool {
        worker.load_score() > OVERLOADED_THRESHOLD
    }

    fn underloaded(worker: &Worker) -> bool {
        worker.load_score() < UNDERLOADED_THRESHOLD && worker.is_eligible()
    }

    /// Run one balance cycle unless the cooldown is still active and no worker is in emergency
    /// (spec.md "never during an active rebalance", "emergency rebalance bypasses the cooldown
    /// when a worker's loadScore > 0.9").
    pub async fn run_cycle(&mut self, ctx: &Context) -> Vec<Migration> {
        let workers = self.registry.list().await.unwrap_or_default();
        let emergency = workers.iter().any(|worker| worker.load_score() > EMERGENCY_THRESHOLD);

        if !emergency {
            if let Some(last) = self.last_cycle {
                if last.elapsed() < self.config.min_cycle_interval {
                    return Vec::new();
                }
            }
        }
        self.last_cycle = Some(Instant::now());

        let overloaded: Vec<&Worker> = workers.iter().filter(|worker| Self::overloaded(worker)).collect();
        let underloaded: Vec<&Worker> = workers.iter().filter(|worker| Self::underloaded(worker)).collect();
        if underloaded.is_empty() {
            return Vec::new();
        }

        let mut migrations = Vec::new();
        for source in overloaded {
            if migrations.len() >= self.config.per_cycle_cap {
                break;
            }
            let remaining_cycle_budget = self.config.per_cycle_cap - migrations.len();
            let per_worker_budget = self.config.per_worker_cap.min(remaining_cycle_budget);
            let moved = self.migrate_from(ctx, source, &underloaded, per_worker_budget).await;
            migrations.extend(moved);
        }
        migrations
    }

    async fn migrate_from(&self, ctx: &Context, source: &Worker, underloaded: &[&Worker], budget: usize) -> Vec<Migration> {
        let mut migrations = Vec::new();
        for _ in 0..budget {
            let candidates: Vec<Candidate> = underloaded
                .iter()
                .map(|worker| {
                    let ctx = ScoringContext {
                        required_capabilities: &Default::default(),
                        target_zone: None,
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
            let Some(target) = strategy::select(SelectionStrategy::TopScore, &candidates, "") else {
                break;
            };
            let target_id = target.worker_id.clone();

            let Ok(task) = self.take_head(ctx, &source.worker_id).await else {
                break;
            };
            let Some(mut task) = task else {
                break;
            };
            task.migrated_from = Some(source.worker_id.clone());
            if self.queue_manager.enqueue(ctx, &target_id, task).await.is_err() {
                break;
            }
            migrations.push(Migration {
                from_worker: source.worker_id.clone(),
                to_worker: target_id,
            });
        }
        migrations
    }

    /// Pull the head task off a worker's home queue for migration (the per-queue `lease` semantics
    /// are reused here purely for their atomic pop side effect; callers never ack/nack this
    /// lease since the task is immediately handed to a new home queue instead).
    async fn take_head(&self, ctx: &Context, worker_id: &str) -> fabric_queue::Result<Option<fabric_queue::Task>> {
        let queue = worker_id.to_string();
        match self.queue_manager.lease(ctx, &queue).await {
            Ok(Some(task)) => {
                self.queue_manager.ack(ctx, &queue, &task).await?;
                Ok(Some(task))
            }
            Ok(None) => Ok(None),
            Err(fabric_queue::QueueError::Malformed(_)) => Ok(None),
            Err(error) => Err(error),
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
    use fabric_registry::HeartbeatConfig;
    use fabric_registry::ResourceUsage;

    use super::*;

    fn payload() -> Payload {
        Payload {
            request: "do work".to_string(),
            file: None,
            priority: Default::default(),
            capabilities: Default::default(),
            preferred_zone: None,
        }
    }

    #[tokio::test]
    async fn migrates_from_overloaded_to_underloaded() {
        let broker: Arc<dyn fabric_broker::BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let queue_manager = Arc::new(QueueManager::new(broker.clone(), QueueConfig::default()));
        let ctx = Context::fixture();

        let mut busy = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        busy.resource_usage = ResourceUsage {
            cpu: 1.0,
            memory: 1.0,
            connections: 10,
            max_connections: 10,
            ..Default::default()
        };
        let idle = Worker::new("worker-b", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, busy).await.unwrap();
        registry.register(&ctx, idle).await.unwrap();

        queue_manager.enqueue(&ctx, &"worker-a".to_string(), Task::new("worker-a", payload())).await.unwrap();

        let mut balancer = Balancer::new(registry, queue_manager.clone(), BalancerConfig::default());
        let migrations = balancer.run_cycle(&ctx).await;

        assert_eq!(migrations.len(), 1);
        assert_eq!(queue_manager.queue_depth(&"worker-b".to_string()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cooldown_blocks_a_second_cycle_without_emergency() {
        let broker: Arc<dyn fabric_broker::BrokerClient> = Arc::new(MemoryBroker::new());
        let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
        let queue_manager = Arc::new(QueueManager::new(broker.clone(), QueueConfig::default()));
        let ctx = Context::fixture();

        let mut busy = Worker::new("worker-a", "openai", "gpt-4", 4, "us-east");
        busy.resource_usage = ResourceUsage { cpu: 0.8, ..Default::default() };
        let idle = Worker::new("worker-b", "openai", "gpt-4", 4, "us-east");
        registry.register(&ctx, busy).await.unwrap();
        registry.register(&ctx, idle).await.unwrap();

        let mut balancer = Balancer::new(registry, queue_manager, BalancerConfig::default());
        balancer.run_cycle(&ctx).await;
        let second = balancer.run_cycle(&ctx).await;
        assert!(second.is_empty());
    }
}
