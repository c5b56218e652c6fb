//! Errors reported by the File-Lock / Conflict Arbiter.

/// Outcome of a failed [`crate::manager::LockManager::claim`].
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("resource '{0}' is held by '{1}'")]
    HeldBy(String, String),

    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),
}

/// Raised when a release is attempted by a worker that does not currently own the resource.
#[derive(Debug, thiserror::Error)]
#[error("resource '{0}' is not held by '{1}'")]
pub struct NotOwner(pub String, pub String);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error(transparent)]
    NotOwner(#[from] NotOwner),

    #[error(transparent)]
    Broker(#[from] fabric_broker::BrokerError),

    #[error("timed out waiting for '{0}' to be released")]
    WaitTimeout(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
