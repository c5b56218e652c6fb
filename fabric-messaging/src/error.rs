//! Errors reported by Inter-Worker Messaging.

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error("message payload could not be (de)serialized: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MessagingError>;
