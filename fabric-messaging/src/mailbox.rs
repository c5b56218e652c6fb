//! `SendDirect`/`Broadcast` and mailbox draining (spec.md §4.5).
use std::sync::Arc;

use chrono::Utc;
use fabric_broker::BrokerClient;
use fabric_context::Context;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::message::BroadcastMessage;
use crate::message::DirectedMessage;
use crate::message::MessagePriority;

/// Inter-worker messaging: per-worker mailboxes and transient broadcast channels.
///
/// No message is retried by messaging itself (spec.md §4.5): callers building collaboration
/// workflows on top (`coord_request`/`analysis_request`) own their own timeouts and retries.
pub struct Messaging {
    broker: Arc<dyn BrokerClient>,
}

impl Messaging {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Messaging {
        Messaging { broker }
    }

    fn mailbox_key(worker_id: &str) -> String {
        format!("messages:{worker_id}")
    }

    fn wakeup_channel(worker_id: &str) -> String {
        format!("wakeup:{worker_id}")
    }

    fn broadcast_channel(channel: &str) -> String {
        format!("broadcast:{channel}")
    }

    /// Append a message to `to`'s mailbox and publish a wakeup (spec.md `SendDirect`).
    pub async fn send_direct(
        &self,
        ctx: &Context,
        from: &str,
        to: &str,
        message_type: impl Into<String>,
        payload: Value,
        priority: MessagePriority,
    ) -> Result<DirectedMessage> {
        let message = DirectedMessage {
            id: Uuid::new_v4(),
            from: from.to_string(),
            to: to.to_string(),
            message_type: message_type.into(),
            payload,
            priority,
            created_at: Utc::now(),
        };
        let blob = serde_json::to_value(&message)?;
        self.broker.enqueue_tail(&Self::mailbox_key(to), blob).await?;
        self.broker.publish(&Self::wakeup_channel(to), &message.id.to_string()).await?;
        slog::debug!(
            ctx.logger, "Sent directed message";
            "from" => from, "to" => to, "type" => %message.message_type,
        );
        Ok(message)
    }

    /// Publish-only broadcast on `broadcast:<channel>` (spec.md `Broadcast`).
    pub async fn broadcast(
        &self,
        ctx: &Context,
        from: &str,
        channel: &str,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Result<BroadcastMessage> {
        let message = BroadcastMessage {
            id: Uuid::new_v4(),
            from: from.to_string(),
            channel: channel.to_string(),
            message_type: message_type.into(),
            payload,
            created_at: Utc::now(),
        };
        self.broker
            .publish(&Self::broadcast_channel(channel), &serde_json::to_string(&message)?)
            .await?;
        slog::debug!(ctx.logger, "Broadcast message"; "from" => from, "channel" => channel);
        Ok(message)
    }

    /// Subscribe to a broadcast channel.
    pub async fn subscribe_broadcast(
        &self,
        channel: &str,
    ) -> Result<tokio::sync::broadcast::Receiver<String>> {
        Ok(self.broker.subscribe(&Self::broadcast_channel(channel)).await?)
    }

    /// Subscribe to the wakeup channel for a worker's own mailbox.
    pub async fn subscribe_wakeup(
        &self,
        worker_id: &str,
    ) -> Result<tokio::sync::broadcast::Receiver<String>> {
        Ok(self.broker.subscribe(&Self::wakeup_channel(worker_id)).await?)
    }

    /// Number of undelivered messages in `worker_id`'s mailbox.
    pub async fn mailbox_len(&self, worker_id: &str) -> Result<usize> {
        Ok(self.broker.list_len(&Self::mailbox_key(worker_id)).await?)
    }

    /// Drain the oldest undelivered message from `worker_id`'s mailbox, in arrival order
    /// (spec.md "Messages are consumed in arrival order").
    ///
    /// Draining reuses the broker's atomic pop-push (`lease_head`) against a scratch processing
    /// list that is immediately acked, since a plain FIFO pop is not part of the broker's
    /// primitive set (spec.md §4.1) but is trivially composable from the two it does expose.
    pub async fn receive(&self, worker_id: &str) -> Result<Option<DirectedMessage>> {
        let mailbox = Self::mailbox_key(worker_id);
        let scratch = format!("-:mailbox-drain:{worker_id}");
        let Some(blob) = self.broker.lease_head(&mailbox, &scratch).await? else {
            return Ok(None);
        };
        self.broker.ack_from_processing(&scratch, &blob).await?;
        let message = serde_json::from_value(blob)?;
        Ok(Some(message))
    }
}
