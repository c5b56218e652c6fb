//! `fabric-cli recommend <file> <prompt>`: classify a prompt and preview which registered
//! worker it would route to, without actually enqueueing it.
use std::path::Path;

use fabric_context::Context;
use fabric_dispatch::classify_category;
use fabric_dispatch::classify_complexity;
use fabric_dispatch::is_eligible;
use fabric_dispatch::required_capabilities;
use fabric_dispatch::selection_score;
use fabric_dispatch::ScoringContext;
use fabric_dispatch::SelectionHints;
use fabric_queue::Payload;

use crate::error::CliError;
use crate::error::Result;
use crate::fabric;

pub async fn run(ctx: &Context, file: &Path, prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(CliError::InvalidArgument("prompt must not be empty".to_string()));
    }

    let demo = fabric::demo(ctx).await?;
    let payload = Payload {
        request: prompt.to_string(),
        file: Some(file.display().to_string()),
        priority: Default::default(),
        capabilities: Default::default(),
        preferred_zone: None,
    };

    let category = classify_category(&payload.request);
    let complexity = classify_complexity(&payload, None);
    let required = required_capabilities(&payload, category, complexity);

    println!("category:       {}", category.as_str());
    println!("complexity:     {:?}", complexity);
    println!("required caps:  {:?}", required);
    println!();

    let workers = demo.registry.list().await?;
    let mut ranked: Vec<(String, f64, bool)> = workers
        .iter()
        .map(|worker| {
            let scoring_ctx = ScoringContext {
                required_capabilities: &required,
                target_zone: None,
                success_rate: 0.8,
                cost_per_unit: None,
                hints: SelectionHints::default(),
            };
            let eligible = !demo.registry.is_stale(worker) && is_eligible(worker, &scoring_ctx);
            (worker.worker_id.clone(), selection_score(worker, &scoring_ctx), eligible)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    println!("{:<20} {:<10} {:<10}", "WORKER", "SCORE", "ELIGIBLE");
    for (worker_id, score, eligible) in &ranked {
        println!("{:<20} {:<10.3} {:<10}", worker_id, score, eligible);
    }

    match ranked.iter().find(|(_, _, eligible)| *eligible) {
        Some((worker_id, score, _)) => println!("\nrecommended: {} (score {:.3})", worker_id, score),
        None => println!("\nno eligible worker found"),
    }
    Ok(())
}
