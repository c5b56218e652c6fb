//! Builds a standalone, in-process fabric for the CLI to operate against.
//!
//! The broker is an in-memory primitive (spec.md §4.1 "no external dependency"): there is no
//! shared daemon process a CLI could attach to over the network. Each invocation therefore seeds
//! its own [`MemoryBroker`], registers a small fleet of demo workers, and enqueues a handful of
//! representative tasks, so `status`/`report`/`balance`/`recommend` have real state to act on
//! within the lifetime of one command.
use std::sync::Arc;

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
use fabric_registry::ResourceUsage;
use fabric_registry::Worker;

use crate::error::Result;

pub struct Fabric {
    pub broker: Arc<dyn BrokerClient>,
    pub registry: Arc<Registry>,
    pub queue_manager: Arc<QueueManager<String>>,
    pub balancer: Balancer,
}

async fn register(registry: &Registry, ctx: &Context, worker: Worker) -> Result<()> {
    registry.register(ctx, worker).await?;
    Ok(())
}

/// Seed a small demo fleet: a lightly loaded `coding` worker, a busy `testing` worker, and an
/// idle `security` worker in a second zone, so balance/status/report all have something to show.
pub async fn demo(ctx: &Context) -> Result<Fabric> {
    let broker: Arc<dyn BrokerClient> = Arc::new(MemoryBroker::new());
    let registry = Arc::new(Registry::new(broker.clone(), HeartbeatConfig::default()));
    let queue_manager = Arc::new(QueueManager::new(broker.clone(), QueueConfig::default()));

    let coder = Worker::new("worker-coder-1", "openai", "gpt-4", 4, "us-east").with_capability("coding");
    register(&registry, ctx, coder).await?;

    let mut tester = Worker::new("worker-tester-1", "openai", "gpt-4", 4, "us-east").with_capability("testing");
    tester.resource_usage = ResourceUsage {
        cpu: 0.85,
        memory: 0.7,
        connections: 8,
        max_connections: 10,
        response_time_ms: 900.0,
        error_rate: 0.05,
    };
    register(&registry, ctx, tester).await?;

    let security = Worker::new("worker-security-1", "anthropic", "claude", 2, "eu-west").with_capability("security");
    register(&registry, ctx, security).await?;

    queue_manager
        .enqueue(ctx, &"worker-coder-1".to_string(), Task::new("worker-coder-1", payload("fix bug in login handler")))
        .await?;
    queue_manager
        .enqueue(ctx, &"worker-tester-1".to_string(), Task::new("worker-tester-1", payload("write unit tests for the parser")))
        .await?;
    queue_manager
        .enqueue(ctx, &"worker-tester-1".to_string(), Task::new("worker-tester-1", payload("add regression coverage")))
        .await?;

    let balancer = Balancer::new(registry.clone(), queue_manager.clone(), BalancerConfig::default());
    Ok(Fabric { broker, registry, queue_manager, balancer })
}

fn payload(request: &str) -> Payload {
    Payload {
        request: request.to_string(),
        file: None,
        priority: Default::default(),
        capabilities: Default::default(),
        preferred_zone: None,
    }
}
