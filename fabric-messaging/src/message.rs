//! Message types (spec.md §3 "Message", §4.5 collaboration workflows).
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// A directed message, delivered to `to`'s mailbox until drained (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectedMessage {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub message_type: String,
    pub payload: Value,
    pub priority: MessagePriority,
    pub created_at: DateTime<Utc>,
}

/// A broadcast message: transient pub/sub, no mailbox (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub id: Uuid,
    pub from: String,
    pub channel: String,
    pub message_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

/// Well-known collaboration workflows (spec.md §4.5). Messaging itself is a dumb pipe: these
/// are conventions the fabric's higher layers build on top, not types the broker distinguishes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Collaboration {
    CoordRequest { resource: String, task_ref: String },
    CoordResponse { accepted: bool, reason: Option<String> },
    AnalysisRequest { payload: Value },
    AnalysisResult { payload: Value },
    AnalysisError { reason: String },
}

impl Collaboration {
    /// The `message_type` tag used when this collaboration message is sent as a
    /// [`DirectedMessage`].
    pub fn message_type(&self) -> &'static str {
        match self {
            Collaboration::CoordRequest { .. } => "coord_request",
            Collaboration::CoordResponse { .. } => "coord_response",
            Collaboration::AnalysisRequest { .. } => "analysis_request",
            Collaboration::AnalysisResult { .. } => "analysis_result",
            Collaboration::AnalysisError { .. } => "analysis_error",
        }
    }

    /// Serialize to the JSON payload carried by a [`DirectedMessage`] (the `type` tag is already
    /// embedded, matching `message_type()`).
    pub fn into_payload(self) -> Value {
        serde_json::to_value(self).expect("Collaboration always serializes to JSON")
    }

    /// Recover a `Collaboration` from a received message's payload.
    pub fn from_payload(payload: Value) -> Option<Collaboration> {
        serde_json::from_value(payload).ok()
    }
}
