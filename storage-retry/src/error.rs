use std::time::Duration;

use thiserror::Error;

/// Errors owned by the retry middleware.
///
/// Configuration problems are reported when the middleware is built. [`BodyNotRewindable`] is
/// raised while sending; it reaches the caller wrapped in
/// [`storage_pipeline::Error::Middleware`] and can be recovered with `downcast_ref`.
///
/// [`BodyNotRewindable`]: RetryError::BodyNotRewindable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error(
        "retry_delay and max_retry_delay must both be zero or both be non-zero, got {retry_delay:?} and {max_retry_delay:?}"
    )]
    InconsistentDelays {
        retry_delay: Duration,
        max_retry_delay: Duration,
    },
    #[error("invalid secondary host {host:?}: {reason}")]
    InvalidSecondaryHost { host: String, reason: String },
    /// The request needs another attempt but its body was a stream that has already been sent.
    #[error("request body cannot be replayed for another attempt. Are you passing a streaming body?")]
    BodyNotRewindable,
}
