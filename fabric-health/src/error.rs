//! Errors surfaced by the Health Monitor.

/// Errors raised while assessing or correcting a queue's health.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error(transparent)]
    Queue(#[from] fabric_queue::QueueError),

    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error("task payload could not be (de)serialized: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HealthError>;
