// Failure types reported by platform ports.
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The platform refuses the request for lack of a permission (e.g. exact alarms).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The service cannot be reached (no runtime, no session bus, device gone).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service was reached but rejected or failed the call.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl PlatformError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        PlatformError::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        PlatformError::Rejected(msg.into())
    }
}

/// Result a deferred task hands back to the host task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    /// Transient failure; the host queue may run the task again with its own backoff.
    Retry,
    /// Permanent failure; the task is dropped.
    Failure,
}
