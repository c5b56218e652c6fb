//! Selection score: the weighted sum the Dispatcher ranks eligible workers by (spec.md §4.7).
use std::collections::BTreeSet;

use fabric_registry::Worker;

/// Hints that add cost/speed bonuses to a worker's score; carried on the task, not the worker.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionHints {
    pub prioritize_cost: bool,
    pub prioritize_speed: bool,
    pub target_zone: Option<&'static str>,
}

/// Inputs the score needs beyond what a [`Worker`] record carries.
pub struct ScoringContext<'a> {
    pub required_capabilities: &'a BTreeSet<String>,
    pub target_zone: Option<&'a str>,
    pub success_rate: f64,
    pub cost_per_unit: Option<f64>,
    pub hints: SelectionHints,
}

fn capability_match(worker: &Worker, required: &BTreeSet<String>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let satisfied = required.iter().filter(|capability| worker.capabilities.contains(*capability)).count();
    satisfied as f64 / required.len() as f64
}

/// Whether `worker` may be considered at all (spec.md §4.7 eligibility predicate, plus zone
/// match when the task requires one).
pub fn is_eligible(worker: &Worker, ctx: &ScoringContext) -> bool {
    if !worker.is_eligible() {
        return false;
    }
    if capability_match(worker, ctx.required_capabilities) <= 0.0 && !ctx.required_capabilities.is_empty() {
        return false;
    }
    match ctx.target_zone {
        Some(zone) => worker.zone == zone,
        None => true,
    }
}

/// The weighted selection score (spec.md §4.7 table): capability match 0.40, available capacity
/// 0.30, health 0.20, historical success rate 0.10, plus a +5 zone bonus and a `+2*priority`
/// bonus, plus cost/speed bonuses when the task carries those hints.
pub fn selection_score(worker: &Worker, ctx: &ScoringContext) -> f64 {
    let capability = capability_match(worker, ctx.required_capabilities);
    let available_capacity = 1.0 - worker.load_score();
    let health = worker.health_score();
    let success_rate = ctx.success_rate.clamp(0.0, 1.0);

    let mut score = 0.40 * capability + 0.30 * available_capacity + 0.20 * health + 0.10 * success_rate;

    if let Some(zone) = ctx.target_zone {
        if worker.zone == zone {
            score += 5.0;
        }
    }
    score += 2.0 * worker.priority as f64;

    if ctx.hints.prioritize_cost {
        if let Some(cost) = ctx.cost_per_unit {
            if cost > 0.0 {
                score += 1.0 / cost;
            }
        }
    }
    if ctx.hints.prioritize_speed {
        let response_time_normalized = (worker.resource_usage.response_time_ms / 10_000.0).clamp(0.0, 1.0);
        score += 1.0 - response_time_normalized;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(zone: &str, capability: &str) -> Worker {
        Worker::new("worker-a", "openai", "gpt-4", 4, zone).with_capability(capability)
    }

    fn ctx<'a>(required: &'a BTreeSet<String>) -> ScoringContext<'a> {
        ScoringContext {
            required_capabilities: required,
            target_zone: None,
            success_rate: 1.0,
            cost_per_unit: None,
            hints: SelectionHints::default(),
        }
    }

    #[test]
    fn full_capability_match_beats_partial() {
        let mut required = BTreeSet::new();
        required.insert("coding".to_string());
        required.insert("testing".to_string());

        let full = worker("us-east", "coding").with_capability("testing");
        let partial = worker("us-east", "coding");

        let full_score = selection_score(&{ let mut w = full; w.state = fabric_registry::WorkerState::Active; w }, &ctx(&required));
        let partial_score = selection_score(&{ let mut w = partial; w.state = fabric_registry::WorkerState::Active; w }, &ctx(&required));
        assert!(full_score > partial_score);
    }

    #[test]
    fn zone_bonus_breaks_ties() {
        let required = BTreeSet::new();
        let mut in_zone = worker("us-east", "coding");
        in_zone.state = fabric_registry::WorkerState::Active;
        let mut out_zone = worker("eu-west", "coding");
        out_zone.state = fabric_registry::WorkerState::Active;

        let mut zoned_ctx = ctx(&required);
        zoned_ctx.target_zone = Some("us-east");
        assert!(selection_score(&in_zone, &zoned_ctx) > selection_score(&out_zone, &zoned_ctx));
    }

    #[test]
    fn ineligible_worker_is_excluded() {
        let required = BTreeSet::new();
        let worker = worker("us-east", "coding");
        assert!(!is_eligible(&worker, &ctx(&required)));
    }
}
