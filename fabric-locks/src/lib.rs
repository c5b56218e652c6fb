//! Exclusive named-resource locks with wait/coordinate/queue/override conflict resolution.
pub mod claim;
pub mod error;
pub mod manager;
pub mod policy;

pub use claim::Claim;
pub use error::LockError;
pub use error::Result;
pub use manager::LockManager;
pub use policy::ConflictContext;
pub use policy::Resolution;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fabric_broker::MemoryBroker;
    use fabric_context::Context;

    use super::*;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryBroker::new()), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn claim_then_release() {
        let manager = manager();
        let ctx = Context::fixture();
        let claim = manager.claim(&ctx, "file-1", "worker-a").await.unwrap();
        assert_eq!(claim.owner(), "worker-a");
        let released = claim.release().await.unwrap();
        assert!(released);
    }

    #[tokio::test]
    async fn second_claim_is_rejected_while_held() {
        let manager = manager();
        let ctx = Context::fixture();
        let _claim = manager.claim(&ctx, "file-1", "worker-a").await.unwrap();
        let second = manager.claim(&ctx, "file-1", "worker-b").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn release_requires_matching_owner() {
        let manager = manager();
        let ctx = Context::fixture();
        let _claim = manager.claim(&ctx, "file-1", "worker-a").await.unwrap();
        let released = manager.release(&ctx, "file-1", "worker-b").await.unwrap();
        assert!(!released);
    }

    #[tokio::test]
    async fn force_claim_overrides_current_holder() {
        let manager = manager();
        let ctx = Context::fixture();
        let _held = manager.claim(&ctx, "file-1", "worker-a").await.unwrap();

        let forced = manager.force_claim(&ctx, "file-1", "worker-b").await.unwrap();
        assert_eq!(forced.owner(), "worker-b");
        assert_eq!(manager.current_owner("file-1").await.unwrap(), Some("worker-b".to_string()));
    }

    #[tokio::test]
    async fn current_owner_is_none_when_unclaimed() {
        let manager = manager();
        assert_eq!(manager.current_owner("file-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn conflict_resolution_overrides_on_missing_owner() {
        let manager = manager();
        let ctx = Context::fixture();
        let policy_ctx = ConflictContext {
            capability_overlap: false,
            resource_is_critical: false,
            request_is_high_priority: false,
            owner_registered: false,
            wait_timeout: Duration::from_millis(10),
        };
        let resolution = manager
            .resolve_conflict(&ctx, "file-1", "worker-b", "task-1", &policy_ctx)
            .await
            .unwrap();
        assert!(matches!(resolution, Resolution::Override { .. }));
    }
}
