//! Errors reported by the Registry.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error("worker record could not be (de)serialized: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("worker '{0}' is not registered")]
    NotRegistered(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
