//! `Claim`/`Release`/`WaitForRelease` over the shared broker (spec.md §4.4).
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fabric_broker::BrokerClient;
use fabric_context::Context;
use serde_json::json;
use tokio::time::timeout;

use crate::claim::Claim;
use crate::error::ClaimError;
use crate::error::LockError;
use crate::error::Result;
use crate::policy::ConflictContext;
use crate::policy::Resolution;

const AUDIT_LOG: &str = "locks:audit";
const WORK_QUEUED_CHANNEL: &str = "work:queued";
const COORDINATION_REQUESTS_CHANNEL: &str = "coordination:requests";

/// Exclusive named-resource locks (spec.md §4.4), backed by `lock:<resource>` compare-and-set
/// keys with a TTL.
pub struct LockManager {
    broker: Arc<dyn BrokerClient>,
    default_ttl: Duration,
}

impl LockManager {
    pub fn new(broker: Arc<dyn BrokerClient>, default_ttl: Duration) -> LockManager {
        LockManager { broker, default_ttl }
    }

    fn key(resource: &str) -> String {
        format!("lock:{resource}")
    }

    fn released_channel(resource: &str) -> String {
        format!("lock:released:{resource}")
    }

    /// Atomically set `lock:resource = owner` only if absent (spec.md `Claim`).
    pub async fn claim(&self, ctx: &Context, resource: &str, owner: &str) -> Result<Claim> {
        let granted = self
            .broker
            .kv_set_if_absent(&Self::key(resource), owner, self.default_ttl)
            .await
            .map_err(ClaimError::Broker)?;
        if !granted {
            let current_owner = self
                .broker
                .kv_get(&Self::key(resource))
                .await
                .map_err(ClaimError::Broker)?
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(LockError::Claim(ClaimError::HeldBy(
                resource.to_string(),
                current_owner,
            )));
        }
        slog::debug!(ctx.logger, "Claimed lock"; "resource" => resource, "owner" => owner);
        Ok(Claim::new(
            self.broker.clone(),
            ctx.logger.clone(),
            resource.to_string(),
            owner.to_string(),
        ))
    }

    /// Current holder of `lock:resource`, if any.
    pub async fn current_owner(&self, resource: &str) -> Result<Option<String>> {
        Ok(self.broker.kv_get(&Self::key(resource)).await?)
    }

    /// Unconditionally take ownership of `resource`, overwriting any current holder (spec.md
    /// §4.4 `Override`: "force-lock with reason recorded to txlog"). Unlike [`LockManager::claim`]
    /// this never fails on conflict — callers reach for it only once policy has already decided
    /// override is the resolution.
    pub async fn force_claim(&self, ctx: &Context, resource: &str, owner: &str) -> Result<Claim> {
        self.broker
            .kv_set_with_ttl(&Self::key(resource), owner, self.default_ttl)
            .await?;
        slog::warn!(ctx.logger, "Force-claimed lock"; "resource" => resource, "owner" => owner);
        Ok(Claim::new(
            self.broker.clone(),
            ctx.logger.clone(),
            resource.to_string(),
            owner.to_string(),
        ))
    }

    /// Compare-and-delete `lock:resource` only if currently owned by `owner` (spec.md `Release`).
    pub async fn release(&self, ctx: &Context, resource: &str, owner: &str) -> Result<bool> {
        let released = self.broker.kv_delete_if(&Self::key(resource), owner).await?;
        if released {
            self.broker
                .publish(&Self::released_channel(resource), owner)
                .await?;
            slog::debug!(ctx.logger, "Released lock"; "resource" => resource, "owner" => owner);
        }
        Ok(released)
    }

    /// Subscribe to release events and wait up to `timeout_duration` for one to arrive
    /// (spec.md `WaitForRelease`).
    pub async fn wait_for_release(
        &self,
        resource: &str,
        timeout_duration: Duration,
    ) -> Result<()> {
        let mut receiver = self.broker.subscribe(&Self::released_channel(resource)).await?;
        match timeout(timeout_duration, receiver.recv()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(LockError::WaitTimeout(resource.to_string())),
        }
    }

    /// Resolve a claim conflict per spec.md §4.4's table, auditing overrides and queued intents.
    pub async fn resolve_conflict(
        &self,
        ctx: &Context,
        resource: &str,
        requester: &str,
        task_ref: &str,
        policy_ctx: &ConflictContext,
    ) -> Result<Resolution> {
        let resolution = crate::policy::resolve(policy_ctx);
        match &resolution {
            Resolution::Coordinate => {
                self.broker
                    .publish(
                        COORDINATION_REQUESTS_CHANNEL,
                        &json!({
                            "resource": resource,
                            "requester": requester,
                            "task_ref": task_ref,
                        })
                        .to_string(),
                    )
                    .await?;
            }
            Resolution::Override { reason } => {
                self.audit(ctx, resource, requester, "override", reason).await?;
            }
            Resolution::Wait { timeout: wait_timeout } => {
                if self.wait_for_release(resource, *wait_timeout).await.is_err() {
                    self.enqueue_intent(ctx, resource, requester, task_ref).await?;
                }
            }
        }
        Ok(resolution)
    }

    async fn enqueue_intent(&self, ctx: &Context, resource: &str, requester: &str, task_ref: &str) -> Result<()> {
        let queue = format!("work_queue:{resource}");
        let entry = json!({"requester": requester, "task_ref": task_ref});
        self.broker.enqueue_tail(&queue, entry).await?;
        self.broker
            .publish(
                WORK_QUEUED_CHANNEL,
                &json!({"resource": resource, "requester": requester}).to_string(),
            )
            .await?;
        self.audit(ctx, resource, requester, "queue", "wait timed out").await?;
        Ok(())
    }

    async fn audit(&self, ctx: &Context, resource: &str, requester: &str, action: &str, reason: &str) -> Result<()> {
        let entry = json!({
            "resource": resource,
            "requester": requester,
            "action": action,
            "reason": reason,
            "ts": Utc::now().to_rfc3339(),
        })
        .to_string();
        self.broker
            .sorted_set_add(AUDIT_LOG, Utc::now().timestamp_millis(), &entry)
            .await?;
        self.broker.sorted_set_trim(AUDIT_LOG, 1000).await?;
        slog::info!(ctx.logger, "Lock conflict resolved"; "resource" => resource, "action" => action, "reason" => reason);
        Ok(())
    }
}
