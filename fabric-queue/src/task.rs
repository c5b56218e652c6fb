//! The task record (spec.md §3 "Task").
use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use uuid::Uuid;

/// Relative urgency of a task, used by the Dispatcher's scoring and the Queue Manager's
/// lease ordering tie-break.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Classification hints carried alongside the opaque request payload.
///
/// `request` is deliberately untyped free text: the fabric never interprets prompt content, it
/// only uses it (together with `file` and `capabilities`) to derive the task's idempotency
/// fingerprint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payload {
    /// Free-text request body (e.g. the prompt to complete).
    pub request: String,

    /// Optional identifier of a file this request operates against.
    #[serde(default)]
    pub file: Option<String>,

    /// Relative urgency.
    #[serde(default)]
    pub priority: Priority,

    /// Capabilities a worker must declare to be eligible for this task.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Zone the submitter would prefer the task run in, if any.
    #[serde(default)]
    pub preferred_zone: Option<String>,
}

/// A unit of work moving through a queue's {queue, processing, DLQ} lifecycle (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub queue: String,
    pub fingerprint: String,
    pub payload: Payload,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u16,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Classification of `last_error` ("transient"/"permanent"), set by
    /// [`crate::manager::QueueManager::nack`] (spec.md §7 error taxonomy). Read by the Health
    /// Monitor's DLQ scan to tell retriable failures from permanent ones.
    #[serde(default)]
    pub last_error_kind: Option<String>,
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub migrated_from: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Set by Health Monitor when a task is pulled off the head of `processing:Q` after
    /// `stuckThreshold` with no ack (spec.md §4.2, §4.7).
    #[serde(default)]
    pub previously_stuck: bool,
    /// Set when a task is reinserted from the DLQ by an operator or the periodic scan
    /// (spec.md §4.7).
    #[serde(default)]
    pub retried_from_dlq: bool,
    /// Number of times this task has been pulled back out of a DLQ, checked against
    /// `QueueConfig::max_dlq_retries` (spec.md §9).
    #[serde(default)]
    pub dlq_retries: u16,
}

impl Task {
    /// Build a new task for `queue`, deriving its fingerprint from `payload` (spec.md §9: `
    /// fingerprint = hash(normalized prompt || file || required-capability set)`).
    pub fn new(queue: impl Into<String>, payload: Payload) -> Task {
        let fingerprint = fingerprint(&payload);
        Task {
            id: Uuid::new_v4(),
            queue: queue.into(),
            fingerprint,
            payload,
            submitted_at: Utc::now(),
            attempts: 0,
            last_error: None,
            last_error_kind: None,
            deadline_at: None,
            migrated_from: None,
            start_time: None,
            previously_stuck: false,
            retried_from_dlq: false,
            dlq_retries: 0,
        }
    }
}

/// One entry of a queue's bounded transaction log (spec.md §6 `txlog:<name>`), as written by
/// [`crate::manager::QueueManager`] and read back by the Health Monitor to compute failure rate
/// and error taxonomy over a trailing window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxlogEvent {
    pub event: String,
    pub task_id: Uuid,
    pub queue: String,
    pub attempts: u16,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<String>,
}

/// Derive the idempotency fingerprint of a payload.
///
/// The prompt is normalised (trimmed, lower-cased) before hashing so that requests differing
/// only in surrounding whitespace or case collide on the same fingerprint, matching the
/// consistent-hash routing use (spec.md §4.6) as well as idempotent-retry dedup (spec.md §9).
pub fn fingerprint(payload: &Payload) -> String {
    let normalized_prompt = payload.request.trim().to_lowercase();
    let file = payload.file.as_deref().unwrap_or("");
    let capabilities: Vec<&str> = payload.capabilities.iter().map(String::as_str).collect();
    let capabilities = capabilities.join(",");

    let mut hasher = Sha256::new();
    hasher.update(normalized_prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(file.as_bytes());
    hasher.update(b"\0");
    hasher.update(capabilities.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(request: &str) -> Payload {
        Payload {
            request: request.to_string(),
            file: None,
            priority: Priority::Normal,
            capabilities: BTreeSet::new(),
            preferred_zone: None,
        }
    }

    #[test]
    fn fingerprint_normalizes_whitespace_and_case() {
        let a = fingerprint(&payload("Summarize this  "));
        let b = fingerprint(&payload("summarize this"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_capabilities() {
        let mut with_vision = payload("describe this image");
        with_vision.capabilities.insert("vision".to_string());
        let without = payload("describe this image");
        assert_ne!(fingerprint(&with_vision), fingerprint(&without));
    }

    #[test]
    fn new_task_derives_fingerprint_from_payload() {
        let task = Task::new("llm-default", payload("hello"));
        assert_eq!(task.fingerprint, fingerprint(&task.payload));
        assert_eq!(task.attempts, 0);
    }
}
