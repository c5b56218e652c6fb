//! The worker lifecycle state machine (spec.md §4.3, §9 redesign notes).
//!
//! The source expresses worker lifecycle with mixin/inheritance; this is replaced with a plain
//! enum and an explicit transition function, favouring a polymorphic capability set over an
//! inheritance hierarchy (spec.md §9 redesign notes).
use serde::Deserialize;
use serde::Serialize;

use crate::worker::HealthSignals;
use crate::worker::ResourceUsage;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Initializing,
    Active,
    Degraded,
    Critical,
    ShuttingDown,
    Deregistered,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Deregistered)
    }

    /// Whether a worker in this state is still excluded from selection (a stale worker is
    /// excluded regardless of state; this covers the states that are always unselectable).
    pub fn is_unselectable(&self) -> bool {
        matches!(
            self,
            WorkerState::Initializing | WorkerState::ShuttingDown | WorkerState::Deregistered
        )
    }
}

/// Thresholds driving the degraded/critical classification (spec.md §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    pub degraded_failure_rate: f64,
    pub degraded_memory: f64,
    pub degraded_response_time_ms: f64,
    pub critical_failure_rate: f64,
    pub critical_memory: f64,
    pub critical_errors_per_minute: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        HealthThresholds {
            degraded_failure_rate: 0.10,
            degraded_memory: 0.70,
            degraded_response_time_ms: 5_000.0,
            critical_failure_rate: 0.25,
            critical_memory: 0.90,
            critical_errors_per_minute: 15.0,
        }
    }
}

/// Evaluate the health-driven component of the state machine: `active`, `degraded`, or
/// `critical`, given the current resource usage and health signals (spec.md §4.3).
pub fn classify_health(
    usage: &ResourceUsage,
    health: &HealthSignals,
    thresholds: &HealthThresholds,
) -> WorkerState {
    if health.failure_rate > thresholds.critical_failure_rate
        || usage.memory > thresholds.critical_memory
        || health.errors_per_minute >= thresholds.critical_errors_per_minute
    {
        return WorkerState::Critical;
    }
    if health.failure_rate > thresholds.degraded_failure_rate
        || usage.memory > thresholds.degraded_memory
        || usage.response_time_ms > thresholds.degraded_response_time_ms
    {
        return WorkerState::Degraded;
    }
    WorkerState::Active
}

/// Explicit transition function for the worker lifecycle.
///
/// `Initializing -> Active` happens once, on the first successful heartbeat. From `Active` the
/// health-driven states (`Active`/`Degraded`/`Critical`) move freely in either direction as
/// health changes. `ShuttingDown` and `Deregistered` are one-way and only reachable through an
/// explicit `begin_shutdown`/`deregister` call, never through health re-evaluation.
pub fn transition(current: WorkerState, requested: WorkerState) -> WorkerState {
    match (current, requested) {
        (WorkerState::ShuttingDown, WorkerState::Deregistered) => WorkerState::Deregistered,
        (WorkerState::ShuttingDown, _) => WorkerState::ShuttingDown,
        (WorkerState::Deregistered, _) => WorkerState::Deregistered,
        (_, WorkerState::ShuttingDown) => WorkerState::ShuttingDown,
        (_, WorkerState::Deregistered) => WorkerState::Deregistered,
        (WorkerState::Initializing, health_state) => health_state,
        (_, health_state) => health_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_critical_over_degraded() {
        let usage = ResourceUsage {
            memory: 0.95,
            ..Default::default()
        };
        let health = HealthSignals::default();
        let state = classify_health(&usage, &health, &HealthThresholds::default());
        assert_eq!(state, WorkerState::Critical);
    }

    #[test]
    fn classifies_degraded_on_response_time() {
        let usage = ResourceUsage {
            response_time_ms: 6_000.0,
            ..Default::default()
        };
        let health = HealthSignals::default();
        let state = classify_health(&usage, &health, &HealthThresholds::default());
        assert_eq!(state, WorkerState::Degraded);
    }

    #[test]
    fn shutting_down_is_sticky_until_deregistered() {
        let state = transition(WorkerState::ShuttingDown, WorkerState::Active);
        assert_eq!(state, WorkerState::ShuttingDown);
        let state = transition(state, WorkerState::Deregistered);
        assert_eq!(state, WorkerState::Deregistered);
    }

    #[test]
    fn deregistered_is_terminal() {
        let state = transition(WorkerState::Deregistered, WorkerState::Active);
        assert_eq!(state, WorkerState::Deregistered);
        assert!(state.is_terminal());
    }
}
