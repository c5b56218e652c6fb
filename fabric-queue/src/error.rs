//! Errors reported by the Queue Manager.

/// A task's payload failed validation and was moved straight to the DLQ without leasing
/// (spec.md "Validate task; if malformed → ack-and-DLQ with permanent error").
#[derive(Debug, thiserror::Error)]
#[error("task {0} failed payload validation: {1}")]
pub struct MalformedTask(pub uuid::Uuid, pub String);

/// Raised when a caller acks or nacks a task id that is not present in the processing set.
///
/// Per spec.md §4.2 this is not surfaced as a hard failure by the Queue Manager itself (acks
/// are best-effort) but the lower-level primitive still reports it so callers that want to know
/// the difference (tests, the Health Monitor) can.
#[derive(Debug, thiserror::Error)]
#[error("task {0} was not found in processing:{1}")]
pub struct NotInProcessing(pub uuid::Uuid, pub String);

/// A DLQ retry was rejected by the dampener or the hard cap (spec.md §4.7, §9).
#[derive(Debug, thiserror::Error)]
pub enum DlqRetryRejected {
    #[error("task {0} was retried from the DLQ less than 5 minutes ago")]
    Dampened(uuid::Uuid),
    #[error("task {0} already exhausted its {1} allowed DLQ retries")]
    CapExceeded(uuid::Uuid, u16),
}

/// Errors surfaced by [`crate::manager::QueueManager`] beyond the broker's own classification.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error(transparent)]
    Malformed(#[from] MalformedTask),

    #[error(transparent)]
    DlqRetryRejected(#[from] DlqRetryRejected),

    #[error("task payload could not be (de)serialized: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
