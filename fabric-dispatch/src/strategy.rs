//! Selection strategies: how a ranked set of (worker, score) candidates is reduced to one pick
//! (spec.md §4.7 "Selection strategy").
use fabric_registry::Worker;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectionStrategy {
    LeastLoaded,
    WeightedRoundRobin,
    ConsistentHash,
    Random,
    TopScore,
}

/// A candidate worker together with its computed selection score.
pub struct Candidate<'a> {
    pub worker: &'a Worker,
    pub score: f64,
}

/// Reduce `candidates` to one pick under `strategy`. `fingerprint` is consulted only by
/// `ConsistentHash`. Returns `None` for an empty candidate set.
pub fn select<'a>(
    strategy: SelectionStrategy,
    candidates: &'a [Candidate<'a>],
    fingerprint: &str,
) -> Option<&'a Worker> {
    if candidates.is_empty() {
        return None;
    }
    match strategy {
        SelectionStrategy::TopScore => top_score(candidates),
        SelectionStrategy::LeastLoaded => least_loaded(candidates),
        SelectionStrategy::WeightedRoundRobin => weighted_round_robin(candidates),
        SelectionStrategy::ConsistentHash => consistent_hash(candidates, fingerprint),
        SelectionStrategy::Random => random(candidates),
    }
}

fn top_score<'a>(candidates: &'a [Candidate<'a>]) -> Option<&'a Worker> {
    candidates
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|candidate| candidate.worker)
}

fn least_loaded<'a>(candidates: &'a [Candidate<'a>]) -> Option<&'a Worker> {
    candidates
        .iter()
        .min_by(|a, b| a.worker.load_score().total_cmp(&b.worker.load_score()))
        .map(|candidate| candidate.worker)
}

/// Pick proportional to `score * (1 - load + 0.1)` (spec.md §4.7).
fn weighted_round_robin<'a>(candidates: &'a [Candidate<'a>]) -> Option<&'a Worker> {
    let weights: Vec<f64> = candidates
        .iter()
        .map(|candidate| (candidate.score * (1.0 - candidate.worker.load_score() + 0.1)).max(0.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return top_score(candidates);
    }
    let mut target = rand::thread_rng().gen_range(0.0..total);
    for (candidate, weight) in candidates.iter().zip(weights.iter()) {
        if target < *weight {
            return Some(candidate.worker);
        }
        target -= weight;
    }
    candidates.last().map(|candidate| candidate.worker)
}

/// Deterministic pick by `fingerprint`: every call with the same fingerprint and candidate set
/// routes to the same worker (spec.md §4.7 `consistent_hash`).
fn consistent_hash<'a>(candidates: &'a [Candidate<'a>], fingerprint: &str) -> Option<&'a Worker> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::Hash;
    use std::hash::Hasher;

    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.worker.worker_id.cmp(&b.worker.worker_id));
    let mut hasher = DefaultHasher::new();
    fingerprint.hash(&mut hasher);
    let index = (hasher.finish() as usize) % sorted.len();
    Some(sorted[index].worker)
}

fn random<'a>(candidates: &'a [Candidate<'a>]) -> Option<&'a Worker> {
    candidates.choose(&mut rand::thread_rng()).map(|candidate| candidate.worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str) -> Worker {
        let mut worker = Worker::new(id, "openai", "gpt-4", 4, "us-east");
        worker.state = fabric_registry::WorkerState::Active;
        worker
    }

    #[test]
    fn top_score_picks_the_highest() {
        let a = worker("a");
        let b = worker("b");
        let candidates = vec![
            Candidate { worker: &a, score: 0.5 },
            Candidate { worker: &b, score: 0.9 },
        ];
        let picked = select(SelectionStrategy::TopScore, &candidates, "fp").unwrap();
        assert_eq!(picked.worker_id, "b");
    }

    #[test]
    fn consistent_hash_is_deterministic() {
        let a = worker("a");
        let b = worker("b");
        let candidates = vec![
            Candidate { worker: &a, score: 0.5 },
            Candidate { worker: &b, score: 0.5 },
        ];
        let first = select(SelectionStrategy::ConsistentHash, &candidates, "task-fingerprint").unwrap();
        let second = select(SelectionStrategy::ConsistentHash, &candidates, "task-fingerprint").unwrap();
        assert_eq!(first.worker_id, second.worker_id);
    }

    #[test]
    fn least_loaded_ignores_score() {
        let mut a = worker("a");
        a.resource_usage.cpu = 0.9;
        let b = worker("b");
        let candidates = vec![
            Candidate { worker: &a, score: 0.9 },
            Candidate { worker: &b, score: 0.1 },
        ];
        let picked = select(SelectionStrategy::LeastLoaded, &candidates, "fp").unwrap();
        assert_eq!(picked.worker_id, "b");
    }
}
