use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::Result;

/// Why a [`Scope`] stopped accepting work.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    /// The scope, or one of its parents, was cancelled explicitly.
    #[error("operation was cancelled")]
    Cancelled,
    /// The scope's deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation and deadline handle for one call through the pipeline.
///
/// Attach a scope to a request with [`RequestBuilder::scope`], or insert it into the
/// [`Extensions`](http::Extensions) handed to [`ClientWithMiddleware::execute_with_extensions`].
/// Middleware finds it there and the final send is abandoned as soon as the scope is done.
///
/// Scopes form a tree: [`child`] and [`child_with_timeout`] derive scopes that are cancelled
/// together with their parent, while cancelling a child leaves the parent untouched. A child
/// never outlives its parent's deadline.
///
/// ```
/// use std::time::Duration;
/// use storage_pipeline::Scope;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let operation = Scope::with_timeout(Duration::from_secs(60));
/// let attempt = operation.child_with_timeout(Duration::from_secs(5));
/// assert!(attempt.deadline() <= operation.deadline());
///
/// operation.cancel();
/// assert!(attempt.is_done());
/// # }
/// ```
///
/// [`RequestBuilder::scope`]: crate::RequestBuilder::scope
/// [`ClientWithMiddleware::execute_with_extensions`]: crate::ClientWithMiddleware::execute_with_extensions
/// [`child`]: Self::child
/// [`child_with_timeout`]: Self::child_with_timeout
#[derive(Clone, Debug, Default)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Scope {
    /// A root scope with no deadline. It is only done once cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A root scope that expires `timeout` from now. A timeout too large to represent as an
    /// instant gives a scope without deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Scope {
            token: CancellationToken::new(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// A root scope that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Scope {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Derives a scope with the same deadline that can be cancelled on its own.
    pub fn child(&self) -> Scope {
        Scope {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a scope that expires after `timeout`, or at the parent's deadline if that
    /// comes first.
    pub fn child_with_timeout(&self, timeout: Duration) -> Scope {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        Scope {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, saturating at zero. `None` if the scope has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Releases the scope and everything derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once the scope is cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// The reason the scope is done, or `None` while it is still live.
    ///
    /// Explicit cancellation wins over an expired deadline.
    pub fn error(&self) -> Option<ScopeError> {
        if self.token.is_cancelled() {
            Some(ScopeError::Cancelled)
        } else if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            Some(ScopeError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Waits until the scope is done and reports why.
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ScopeError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ScopeError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }

    /// Drives `future` until it completes or the scope is done, whichever happens first.
    ///
    /// A scope that is already done does not poll `future` at all.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(err) = self.error() {
            return Err(err.into());
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err.into()),
            res = future => res,
        }
    }

    /// Hands ownership of the scope to whoever holds the returned guard. The scope is
    /// cancelled when the last clone of the guard is dropped.
    pub fn guard(&self) -> ScopeGuard {
        ScopeGuard {
            scope: self.clone(),
            _drop: Arc::new(self.token.clone().drop_guard()),
        }
    }
}

/// Owner handle for a [`Scope`], see [`Scope::guard`].
///
/// The retry middleware stores one of these in the extensions of a successful response, tying
/// the attempt's scope to the response's lifetime.
#[derive(Clone, Debug)]
pub struct ScopeGuard {
    scope: Scope,
    _drop: Arc<DropGuard>,
}

impl ScopeGuard {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}
