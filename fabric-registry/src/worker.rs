//! The Worker record (spec.md §3 "Worker").
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::state::WorkerState;

/// Snapshot of a worker's resource consumption, refreshed on every heartbeat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU utilisation, `0.0..=1.0`.
    pub cpu: f64,
    /// Memory utilisation, `0.0..=1.0`.
    pub memory: f64,
    /// Open connections, out of `max_connections`.
    pub connections: u32,
    pub max_connections: u32,
    /// Mean response time of recent Executor calls.
    pub response_time_ms: f64,
    /// Normalised recent error ratio, `0.0..=1.0`, used by the loadScore term.
    pub error_rate: f64,
}

impl ResourceUsage {
    fn connection_saturation(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            self.connections as f64 / self.max_connections as f64
        }
    }

    /// `loadScore` (spec.md §4.7): cpu 0.30, memory 0.25, connection saturation 0.20,
    /// response time normalized to 10s 0.15, error rate 0.10, each clamped to `[0,1]`.
    pub fn load_score(&self) -> f64 {
        let clamp = |v: f64| v.clamp(0.0, 1.0);
        let response_time_normalized = clamp(self.response_time_ms / 10_000.0);
        let score = 0.30 * clamp(self.cpu)
            + 0.25 * clamp(self.memory)
            + 0.20 * clamp(self.connection_saturation())
            + 0.15 * response_time_normalized
            + 0.10 * clamp(self.error_rate);
        clamp(score)
    }
}

/// Additional health signals not captured by the per-call [`ResourceUsage`] snapshot, used for
/// the worker state machine's degraded/critical thresholds (spec.md §4.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSignals {
    /// Ratio of recent task attempts that failed, `0.0..=1.0`.
    pub failure_rate: f64,
    /// Count of errors observed in the trailing minute.
    pub errors_per_minute: f64,
}

impl HealthSignals {
    /// `healthScore` (spec.md §3): not formula-specified in the source; defined here as the
    /// complement of a weighted blend of failure rate, per-minute error pressure, and response
    /// time relative to the critical per-minute error threshold, clamped to `[0,1]`.
    pub fn health_score(&self, usage: &ResourceUsage) -> f64 {
        let clamp = |v: f64| v.clamp(0.0, 1.0);
        let errors_normalized = clamp(self.errors_per_minute / 15.0);
        let response_time_normalized = clamp(usage.response_time_ms / 10_000.0);
        let penalty =
            0.5 * clamp(self.failure_rate) + 0.3 * errors_normalized + 0.2 * response_time_normalized;
        clamp(1.0 - penalty)
    }
}

/// A worker process registered with the fabric (spec.md §3 "Worker").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    /// The upstream compute provider type this worker is bound to.
    pub worker_type: String,
    pub model: String,
    pub capabilities: BTreeSet<String>,
    pub max_concurrency: u32,
    pub current_load: u32,
    pub zone: String,
    /// Configured priority used as `+2 * priority` bonus in selection scoring (spec.md §4.7).
    pub priority: u8,
    pub resource_usage: ResourceUsage,
    pub health: HealthSignals,
    pub state: WorkerState,
    pub last_heartbeat: DateTime<Utc>,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        worker_type: impl Into<String>,
        model: impl Into<String>,
        max_concurrency: u32,
        zone: impl Into<String>,
    ) -> Worker {
        Worker {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
            model: model.into(),
            capabilities: BTreeSet::new(),
            max_concurrency,
            current_load: 0,
            zone: zone.into(),
            priority: 0,
            resource_usage: ResourceUsage::default(),
            health: HealthSignals::default(),
            state: WorkerState::Initializing,
            last_heartbeat: Utc::now(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Worker {
        self.capabilities.insert(capability.into());
        self
    }

    /// `loadScore` derived from the current resource usage snapshot.
    pub fn load_score(&self) -> f64 {
        self.resource_usage.load_score()
    }

    /// `healthScore` derived from the current health signals.
    pub fn health_score(&self) -> f64 {
        self.health.health_score(&self.resource_usage)
    }

    /// Whether this worker is eligible for new leases (spec.md §4.7 eligibility predicate).
    pub fn is_eligible(&self) -> bool {
        self.state == WorkerState::Active
            && self.health_score() > 0.3
            && self.current_load < self.max_concurrency
    }
}
