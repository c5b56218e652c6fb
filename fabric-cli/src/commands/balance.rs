//! `fabric-cli balance`: run one load-balancing cycle and report the migrations made.
use fabric_context::Context;

use crate::error::Result;
use crate::fabric;

pub async fn run(ctx: &Context) -> Result<()> {
    let mut demo = fabric::demo(ctx).await?;
    let migrations = demo.balancer.run_cycle(ctx).await;

    if migrations.is_empty() {
        println!("no migrations: no worker is over the load threshold");
        return Ok(());
    }
    println!("{:<24} {:<24}", "FROM", "TO");
    for migration in migrations {
        println!("{:<24} {:<24}", migration.from_worker, migration.to_worker);
    }
    Ok(())
}
