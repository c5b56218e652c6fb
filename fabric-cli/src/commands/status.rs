//! `fabric-cli status`: registry, queue depth, and DLQ depth for every known worker.
use fabric_context::Context;

use crate::error::Result;
use crate::fabric;

pub async fn run(ctx: &Context) -> Result<()> {
    let demo = fabric::demo(ctx).await?;
    let mut workers = demo.registry.list().await?;
    workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

    println!(
        "{:<20} {:<10} {:<8} {:<6} {:<6} {:<6}",
        "WORKER", "STATE", "LOAD", "QUEUE", "PROC", "DLQ"
    );
    for worker in &workers {
        let queue_depth = demo.queue_manager.queue_depth(&worker.worker_id).await?;
        let processing_depth = demo.queue_manager.processing_depth(&worker.worker_id).await?;
        let dlq_depth = demo.queue_manager.dlq_depth(&worker.worker_id).await?;
        println!(
            "{:<20} {:<10?} {:<8.2} {:<6} {:<6} {:<6}",
            worker.worker_id, worker.state, worker.load_score(), queue_depth, processing_depth, dlq_depth
        );
    }
    Ok(())
}
