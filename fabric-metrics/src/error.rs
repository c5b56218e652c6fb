//! Errors surfaced while sampling or publishing metrics.

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error(transparent)]
    Registry(#[from] fabric_registry::RegistryError),

    #[error("metric payload could not be (de)serialized: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
