use crate::retryable::Retryable;
use crate::routing::Target;
use http::StatusCode;
use storage_pipeline::{is_temporary_status, Error};

/// What the middleware knows about the attempt whose outcome is being classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// 0-based index of the attempt within the operation.
    pub index: u32,
    /// Where the attempt was sent.
    pub target: Target,
    /// Whether the attempt's own time budget ran out, as opposed to the whole operation's.
    pub timed_out: bool,
}

/// A strategy to create a [`Retryable`] from the outcome of an attempt.
///
/// The outcome of an attempt could be:
/// - [`reqwest::Response`] In case the request has been sent and a response received.
///   This could however still mean that the server responded with an erroneous status,
///   for example a 503.
/// - [`storage_pipeline::Error`] In this case the request actually failed.
///   This could, for example, be caused by a connection reset or by the attempt's scope
///   running out of time.
///
/// The middleware checks the caller's own scope before asking the strategy; once the caller
/// has given up, no strategy can trigger another attempt.
///
/// Example:
///
/// ```
/// use reqwest::Response;
/// use storage_pipeline::{ClientBuilder, Error};
/// use storage_retry::{
///     Attempt, DefaultRetryableStrategy, RetryMiddleware, RetryOptions, Retryable,
///     RetryableStrategy,
/// };
///
/// // Also retry 412s, which a flaky proxy in front of the account sends now and then.
/// struct RetryPreconditionFailed;
///
/// impl RetryableStrategy for RetryPreconditionFailed {
///     fn handle(&self, res: &Result<Response, Error>, attempt: &Attempt) -> Option<Retryable> {
///         match res {
///             Ok(resp) if resp.status() == 412 => Some(Retryable::Transient),
///             _ => DefaultRetryableStrategy.handle(res, attempt),
///         }
///     }
/// }
///
/// let retry = RetryMiddleware::new_with_strategy(RetryOptions::default(), RetryPreconditionFailed)
///     .unwrap();
/// let client = ClientBuilder::new(reqwest::Client::new()).with(retry).build();
/// ```
pub trait RetryableStrategy {
    /// Returns `None` when the outcome is final.
    fn handle(&self, res: &Result<reqwest::Response, Error>, attempt: &Attempt)
        -> Option<Retryable>;
}

/// The default [`RetryableStrategy`] for [`RetryMiddleware`](crate::RetryMiddleware).
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRetryableStrategy;

impl RetryableStrategy for DefaultRetryableStrategy {
    fn handle(
        &self,
        res: &Result<reqwest::Response, Error>,
        attempt: &Attempt,
    ) -> Option<Retryable> {
        match res {
            Ok(success) => default_on_request_success(success, attempt),
            Err(error) => default_on_request_failure(error, attempt),
        }
    }
}

/// Default request success retry strategy.
///
/// Will only retry if:
/// * The attempt went to the secondary and the status was 404: the blob may simply not have
///   been replicated yet.
/// * The status is one [`is_temporary_status`] accepts (408, 429, 500, 502, 503, 504).
///
/// Note that success here means that the request finished without interruption, not that it was logically OK.
pub fn default_on_request_success(
    success: &reqwest::Response,
    attempt: &Attempt,
) -> Option<Retryable> {
    let status = success.status();
    if attempt.target == Target::Secondary && status == StatusCode::NOT_FOUND {
        Some(Retryable::NotReplicated)
    } else if is_temporary_status(status) {
        Some(Retryable::Transient)
    } else {
        None
    }
}

/// Default request failure retry strategy.
///
/// Will only retry if:
/// * The attempt went to the secondary and the error carries a 404 status.
/// * The error is temporary: connect failures, connections reset or cut mid-response, or a
///   temporary status surfaced through `Response::error_for_status`.
/// * The error is a timeout and the attempt's own scope is the one that expired.
///
/// Middleware errors are never retried.
pub fn default_on_request_failure(error: &Error, attempt: &Attempt) -> Option<Retryable> {
    if attempt.target == Target::Secondary && error.status() == Some(StatusCode::NOT_FOUND) {
        Some(Retryable::NotReplicated)
    } else if error.is_temporary() || (error.is_timeout() && attempt.timed_out) {
        Some(Retryable::Transient)
    } else {
        Some(Retryable::Fatal)
    }
}
