//! Executor error taxonomy (spec.md §7).

/// Classified outcome of an [`crate::executor::Executor`] invocation.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Timeouts, 5xx, connection reset, broker transient: retry with backoff.
    #[error("transient executor error: {0}")]
    Transient(String),

    /// 429 / provider throttle: retry with backoff, counted separately in metrics.
    #[error("executor rate limited: {0}")]
    RateLimited(String),

    /// 4xx (non-429), malformed payload, unauthorized: never retried.
    #[error("permanent executor error: {0}")]
    Permanent(String),

    /// The task's deadline expired before the Executor returned.
    #[error("task deadline expired")]
    Timeout,

    /// A coordination request for a required lock was denied.
    #[error("coordination request denied: {0}")]
    CoordinationFailed(String),
}

impl ExecutorError {
    /// Whether this error should be retried by requeueing rather than moving to the DLQ
    /// (spec.md §7 "Transient"/"RateLimited" rows).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Transient(_) | ExecutorError::RateLimited(_))
    }

    /// The `lastError`/DLQ classification string recorded on the task (spec.md §7
    /// "DLQ entries carry `{reason, error, ts, attempts}`").
    pub fn reason(&self) -> &'static str {
        match self {
            ExecutorError::Transient(_) => "transient",
            ExecutorError::RateLimited(_) => "rate_limited",
            ExecutorError::Permanent(_) => "permanent",
            ExecutorError::Timeout => "timeout",
            ExecutorError::CoordinationFailed(_) => "coordination_failed",
        }
    }
}
