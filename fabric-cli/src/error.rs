//! Errors surfaced by the CLI, mapped to the exit codes documented for the control surface
//! (spec.md §6 "Exit codes: 0 ok, 1 broker unreachable, 2 invalid arguments").

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error(transparent)]
    Queue(#[from] fabric_queue::QueueError),

    #[error(transparent)]
    Registry(#[from] fabric_registry::RegistryError),

    #[error(transparent)]
    Health(#[from] fabric_health::HealthError),

    #[error(transparent)]
    Metrics(#[from] fabric_metrics::MetricsError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CliError {
    /// Exit code for this error (spec.md §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Broker(_) => 1,
            CliError::Queue(fabric_queue::QueueError::Broker(_)) => 1,
            CliError::Registry(fabric_registry::RegistryError::Broker(_)) => 1,
            CliError::InvalidArgument(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
