//! Worker registration, heartbeat, liveness, and deregistration (spec.md §4.3).
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fabric_broker::BrokerClient;
use fabric_context::Context;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RegistryError;
use crate::error::Result;
use crate::state;
use crate::state::HealthThresholds;
use crate::state::WorkerState;
use crate::worker::HealthSignals;
use crate::worker::ResourceUsage;
use crate::worker::Worker;

const REGISTRY_HASH: &str = "agents:registry";
const STATUS_HASH: &str = "agents:status";
const STATUS_CHANNEL: &str = "worker:status";

/// Heartbeat cadence and the derived liveness window (spec.md §4.3: `H`, default 30s; stale if
/// `now - lastHeartbeat > 2H`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub thresholds: HealthThresholds,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            interval_secs: 30,
            thresholds: HealthThresholds::default(),
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn liveness_window(&self) -> Duration {
        self.interval() * 2
    }
}

/// A lightweight snapshot of a worker's published status, as stored in `agents:status`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub worker_id: String,
    pub state: WorkerState,
    pub load_score: f64,
    pub health_score: f64,
    pub last_heartbeat: chrono::DateTime<Utc>,
}

/// Registration, heartbeat, and liveness over the shared broker.
pub struct Registry {
    broker: Arc<dyn BrokerClient>,
    config: HeartbeatConfig,
}

impl Registry {
    pub fn new(broker: Arc<dyn BrokerClient>, config: HeartbeatConfig) -> Registry {
        Registry { broker, config }
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    async fn write(&self, worker: &Worker) -> Result<()> {
        self.broker
            .hash_set(REGISTRY_HASH, &worker.worker_id, &serde_json::to_string(worker)?)
            .await?;
        let snapshot = StatusSnapshot {
            worker_id: worker.worker_id.clone(),
            state: worker.state,
            load_score: worker.load_score(),
            health_score: worker.health_score(),
            last_heartbeat: worker.last_heartbeat,
        };
        self.broker
            .hash_set(STATUS_HASH, &worker.worker_id, &serde_json::to_string(&snapshot)?)
            .await?;
        Ok(())
    }

    /// Write the Worker record and transition it to `Active` (spec.md `Register(worker)`).
    pub async fn register(&self, ctx: &Context, mut worker: Worker) -> Result<Worker> {
        worker.state = WorkerState::Active;
        worker.last_heartbeat = Utc::now();
        self.write(&worker).await?;
        self.publish_status(&worker).await?;
        slog::info!(ctx.logger, "Worker registered"; "worker" => %worker.worker_id, "zone" => %worker.zone);
        Ok(worker)
    }

    /// Refresh `lastHeartbeat` and the resource snapshot, re-evaluating the health-driven state
    /// (spec.md `Heartbeat()`).
    pub async fn heartbeat(
        &self,
        ctx: &Context,
        mut worker: Worker,
        resource_usage: ResourceUsage,
        health: HealthSignals,
    ) -> Result<Worker> {
        worker.resource_usage = resource_usage;
        worker.health = health;
        worker.last_heartbeat = Utc::now();
        let health_state = state::classify_health(&resource_usage, &health, &self.config.thresholds);
        let next_state = state::transition(worker.state, health_state);
        let changed = next_state != worker.state;
        worker.state = next_state;
        self.write(&worker).await?;
        if changed {
            self.publish_status(&worker).await?;
            slog::warn!(
                ctx.logger, "Worker state changed";
                "worker" => %worker.worker_id, "state" => ?worker.state,
            );
        } else {
            slog::debug!(ctx.logger, "Worker heartbeat"; "worker" => %worker.worker_id);
        }
        Ok(worker)
    }

    /// Begin graceful shutdown: the worker stops accepting new leases but stays registered until
    /// [`Registry::deregister`] is called after draining (spec.md §4.6 `Stop()`).
    pub async fn begin_shutdown(&self, ctx: &Context, mut worker: Worker) -> Result<Worker> {
        worker.state = state::transition(worker.state, WorkerState::ShuttingDown);
        self.write(&worker).await?;
        self.publish_status(&worker).await?;
        slog::info!(ctx.logger, "Worker shutting down"; "worker" => %worker.worker_id);
        Ok(worker)
    }

    /// Remove the Worker record (spec.md `Deregister()`; migration of remaining items is the
    /// Dispatcher's responsibility, spec.md §4.7 "Deregistration migration").
    pub async fn deregister(&self, ctx: &Context, mut worker: Worker) -> Result<()> {
        worker.state = WorkerState::Deregistered;
        self.broker.hash_del(REGISTRY_HASH, &worker.worker_id).await?;
        self.broker.hash_del(STATUS_HASH, &worker.worker_id).await?;
        self.publish_status(&worker).await?;
        slog::info!(ctx.logger, "Worker deregistered"; "worker" => %worker.worker_id);
        Ok(())
    }

    pub async fn get(&self, worker_id: &str) -> Result<Worker> {
        let all = self.broker.hash_get_all(REGISTRY_HASH).await?;
        let raw = all
            .get(worker_id)
            .ok_or_else(|| RegistryError::NotRegistered(worker_id.to_string()))?;
        Ok(serde_json::from_str(raw)?)
    }

    /// All registered workers, including stale ones (callers filter with [`Registry::is_stale`]).
    pub async fn list(&self) -> Result<Vec<Worker>> {
        let all = self.broker.hash_get_all(REGISTRY_HASH).await?;
        let mut workers = Vec::with_capacity(all.len());
        for raw in all.values() {
            workers.push(serde_json::from_str(raw)?);
        }
        Ok(workers)
    }

    /// Workers the liveness rule excludes from selection (spec.md §4.3).
    pub fn is_stale(&self, worker: &Worker) -> bool {
        let age = Utc::now().signed_duration_since(worker.last_heartbeat);
        age.to_std().unwrap_or(Duration::ZERO) > self.config.liveness_window()
    }

    async fn publish_status(&self, worker: &Worker) -> Result<()> {
        let snapshot = StatusSnapshot {
            worker_id: worker.worker_id.clone(),
            state: worker.state,
            load_score: worker.load_score(),
            health_score: worker.health_score(),
            last_heartbeat: worker.last_heartbeat,
        };
        self.broker
            .publish(STATUS_CHANNEL, &serde_json::to_string(&snapshot)?)
            .await?;
        Ok(())
    }
}
