use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::scope::ScopeError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// There was an error running some middleware
    #[error("Middleware error: {0}")]
    Middleware(#[from] anyhow::Error),
    /// Error from the underlying reqwest client
    #[error("Request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The request's [`Scope`](crate::Scope) was done before the response arrived
    #[error("Request abandoned: {0}")]
    Scope(#[from] ScopeError),
}

impl Error {
    pub fn middleware<E>(err: E) -> Self
    where
        E: 'static + Send + Sync + std::error::Error,
    {
        Error::Middleware(err.into())
    }

    /// Returns a possible URL related to this error.
    pub fn url(&self) -> Option<&Url> {
        match self {
            Error::Reqwest(e) => e.url(),
            Error::Middleware(_) | Error::Scope(_) => None,
        }
    }

    /// Returns true if the error was produced while talking to the network, as opposed to
    /// inside some middleware.
    ///
    /// Scope errors count as network errors: they abandon an in-flight send.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Middleware(_) => false,
            Error::Reqwest(_) | Error::Scope(_) => true,
        }
    }

    /// Returns true if the same request may succeed when sent again.
    ///
    /// That covers connection failures, connections reset or closed mid-response, and
    /// statuses reported through `Response::error_for_status` that [`is_temporary_status`]
    /// accepts.
    pub fn is_temporary(&self) -> bool {
        match self {
            Error::Reqwest(e) => is_temporary_reqwest_error(e),
            Error::Middleware(_) | Error::Scope(_) => false,
        }
    }

    /// Returns true if the error is related to a timeout, including an expired scope
    /// deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Middleware(_) => false,
            Error::Reqwest(e) => e.is_timeout(),
            Error::Scope(e) => *e == ScopeError::DeadlineExceeded,
        }
    }

    /// Returns true if the request's scope was cancelled explicitly.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Scope(ScopeError::Cancelled))
    }

    /// Returns true if the error is related to connect
    pub fn is_connect(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_connect(),
            Error::Middleware(_) | Error::Scope(_) => false,
        }
    }

    /// Returns true if the error is related to the request or response body
    pub fn is_body(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_body(),
            Error::Middleware(_) | Error::Scope(_) => false,
        }
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Reqwest(e) => e.status(),
            Error::Middleware(_) | Error::Scope(_) => None,
        }
    }
}

/// Statuses a storage service uses to say "try again later": request timeout, throttling,
/// and the transient 5xx family.
pub fn is_temporary_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_temporary_reqwest_error(error: &reqwest::Error) -> bool {
    if error.is_connect() {
        return true;
    }
    if let Some(status) = error.status() {
        return is_temporary_status(status);
    }
    if !error.is_request() {
        return false;
    }
    // hyper::Error(IncompleteMessage) is raised when the server starts a response and the
    // connection is cut halfway through, Canceled when the server closes the connection.
    match get_source_error_type::<hyper::Error>(error) {
        Some(hyper_error) if hyper_error.is_incomplete_message() || hyper_error.is_canceled() => {
            true
        }
        Some(hyper_error) => {
            get_source_error_type::<std::io::Error>(hyper_error).is_some_and(is_temporary_io_error)
        }
        None => get_source_error_type::<std::io::Error>(error).is_some_and(is_temporary_io_error),
    }
}

fn is_temporary_io_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
    )
}

/// Downcasts the given err source into T.
fn get_source_error_type<T: std::error::Error + 'static>(
    err: &dyn std::error::Error,
) -> Option<&T> {
    let mut source = err.source();

    while let Some(err) = source {
        if let Some(err) = err.downcast_ref::<T>() {
            return Some(err);
        }

        source = err.source();
    }
    None
}
