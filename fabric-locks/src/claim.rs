//! A held claim and its best-effort release-on-drop (grounded on
//! `coordinator::coordinator::lock::NonBlockingLock`).
use std::sync::Arc;

use fabric_broker::BrokerClient;
use slog::Logger;

/// A claimed resource lock.
///
/// Mirrors `coordinator::coordinator::lock::NonBlockingLock`: `release()` performs an explicit, checked release;
/// dropping without calling it still attempts a release so an aborted task does not hold a
/// resource forever. Because release is async and `Drop` is not, the drop path spawns a
/// detached best-effort release rather than blocking the destructor; the TTL is the backstop if
/// that task never gets to run (e.g. runtime already shutting down).
pub struct Claim {
    broker: Arc<dyn BrokerClient>,
    logger: Logger,
    resource: String,
    owner: String,
    released: bool,
}

impl Claim {
    pub(crate) fn new(broker: Arc<dyn BrokerClient>, logger: Logger, resource: String, owner: String) -> Claim {
        Claim {
            broker,
            logger,
            resource,
            owner,
            released: false,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Explicitly release the claim (compare-and-delete on `lock:<resource>`).
    pub async fn release(mut self) -> crate::error::Result<bool> {
        self.released = true;
        let key = format!("lock:{}", self.resource);
        let released = self.broker.kv_delete_if(&key, &self.owner).await?;
        Ok(released)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let broker = self.broker.clone();
        let key = format!("lock:{}", self.resource);
        let owner = self.owner.clone();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            match broker.kv_delete_if(&key, &owner).await {
                Ok(true) => slog::debug!(logger, "Released lock on drop"; "resource" => %key),
                Ok(false) => (),
                Err(error) => {
                    slog::warn!(logger, "Failed to release lock on drop"; "resource" => %key, "error" => %error)
                }
            }
        });
    }
}
