use crate::retryable_strategy::{Attempt, DefaultRetryableStrategy, RetryableStrategy};
use storage_pipeline::Error;

/// Classification of an attempt's outcome that calls for another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retryable {
    /// The failure was due to something that might resolve in the future.
    Transient,
    /// The secondary does not have the resource yet. Later attempts only go to the primary.
    NotReplicated,
    /// Unresolvable error.
    Fatal,
}

impl Retryable {
    /// Try to map the outcome of an attempt into `Retryable` using the
    /// [`DefaultRetryableStrategy`].
    ///
    /// Returns `None` if the outcome is final and the response should be handed back.
    pub fn from_reqwest_response(
        res: &Result<reqwest::Response, Error>,
        attempt: &Attempt,
    ) -> Option<Self> {
        DefaultRetryableStrategy.handle(res, attempt)
    }

    /// Whether the middleware should send another attempt.
    pub fn should_retry(self) -> bool {
        match self {
            Retryable::Transient | Retryable::NotReplicated => true,
            Retryable::Fatal => false,
        }
    }

    #[cfg(feature = "tracing")]
    pub(crate) fn reason(self) -> &'static str {
        match self {
            Retryable::Transient => "transient failure",
            Retryable::NotReplicated => "resource not yet replicated to secondary",
            Retryable::Fatal => "fatal failure",
        }
    }
}
