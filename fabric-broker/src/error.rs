//! Errors reported by the broker client and their retry classification.

/// Errors returned by [`crate::BrokerClient`] operations.
///
/// Every variant is tagged `transient` or `permanent` (spec.md §4.1): transient errors are safe
/// for the caller to retry with backoff, permanent errors must be surfaced instead.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker connection could not be established or was dropped mid-call.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The broker did not respond before the caller's deadline.
    #[error("broker operation timed out")]
    Timeout,

    /// The requested key, queue, or entry does not exist.
    #[error("broker entry not found: {0}")]
    NotFound(String),

    /// The stored value could not be decoded as the type the caller expected.
    #[error("broker value malformed: {0}")]
    Malformed(String),

    /// A compare-and-swap style operation (e.g. compare-and-delete a lock) lost the race.
    #[error("broker precondition failed: {0}")]
    PreconditionFailed(String),
}

impl BrokerError {
    /// True if the caller should retry this operation with backoff (spec.md §4.1, §7).
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Connection(_) | BrokerError::Timeout)
    }
}

/// Result alias used throughout the broker client.
pub type Result<T> = std::result::Result<T, BrokerError>;
