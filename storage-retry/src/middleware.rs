//! `RetryMiddleware` implements retrying storage requests on transient errors, with optional
//! read failover to a secondary host.

use std::time::Duration;

use http::Extensions;
use rand::RngCore;
use reqwest::{Request, Response};
use storage_pipeline::{Error, Middleware, Next, Result, Scope, ScopeError};

use crate::backoff::{jittered, primary_delay, JitterRng, SECONDARY_RETRY_DELAY};
use crate::error::RetryError;
use crate::options::{RetryConfig, RetryOptions};
use crate::retryable::Retryable;
use crate::retryable_strategy::{Attempt, DefaultRetryableStrategy, RetryableStrategy};
use crate::routing::{is_read_only, set_timeout_param, timeout_param_secs, Target};

/// `RetryMiddleware` offers retry logic for storage requests that fail in a transient manner
/// and can be safely executed again.
///
/// Each attempt is bounded by the configured per-try timeout, which is also sent to the
/// service as the `timeout` query parameter, and by the [`Scope`] the caller attached to the
/// request, if any. Attempts are separated by a jittered backoff. When a secondary host is
/// configured, GET and HEAD requests alternate between the primary and the secondary.
///
/// ```rust
/// use reqwest::Client;
/// use storage_pipeline::ClientBuilder;
/// use storage_retry::{RetryMiddleware, RetryOptions};
///
/// let retry = RetryMiddleware::new(RetryOptions {
///     max_tries: 5,
///     secondary_host: Some("account-secondary.blob.core.windows.net".to_string()),
///     ..Default::default()
/// })
/// .unwrap();
/// let client = ClientBuilder::new(Client::new()).with(retry).build();
/// ```
#[derive(Debug)]
pub struct RetryMiddleware<R = DefaultRetryableStrategy> {
    config: RetryConfig,
    strategy: R,
    rng: JitterRng,
}

impl RetryMiddleware {
    /// Construct `RetryMiddleware` from user options, classifying outcomes with the
    /// [`DefaultRetryableStrategy`].
    pub fn new(options: RetryOptions) -> std::result::Result<Self, RetryError> {
        Self::new_with_strategy(options, DefaultRetryableStrategy)
    }
}

impl<R> RetryMiddleware<R>
where
    R: RetryableStrategy + Send + Sync + 'static,
{
    /// Construct `RetryMiddleware` with a custom [`RetryableStrategy`].
    pub fn new_with_strategy(
        options: RetryOptions,
        strategy: R,
    ) -> std::result::Result<Self, RetryError> {
        Ok(Self {
            config: options.validate()?,
            strategy,
            rng: JitterRng::default(),
        })
    }

    /// Draw jitter from `rng` instead of the thread-local generator. Every request sent
    /// through this middleware shares it.
    pub fn with_rng<G>(mut self, rng: G) -> Self
    where
        G: RngCore + Send + 'static,
    {
        self.rng = JitterRng::shared(rng);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl<R> Middleware for RetryMiddleware<R>
where
    R: RetryableStrategy + Send + Sync + 'static,
{
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        self.execute_with_retry(req, next, extensions).await
    }
}

impl<R> RetryMiddleware<R>
where
    R: RetryableStrategy + Send + Sync + 'static,
{
    /// Target and backoff for attempt `index`. Bumps `primary_tries` when the attempt goes to
    /// the primary.
    fn plan(&self, index: u32, use_secondary: bool, primary_tries: &mut u32) -> (Target, Duration) {
        let (target, delay) = if use_secondary && index % 2 == 1 {
            (Target::Secondary, SECONDARY_RETRY_DELAY)
        } else {
            *primary_tries += 1;
            let delay = primary_delay(
                self.config.policy(),
                self.config.retry_delay(),
                *primary_tries,
            );
            (Target::Primary, delay)
        };
        let delay = jittered(delay, self.rng.factor(), self.config.max_retry_delay());
        (target, delay)
    }

    /// Runs the attempts in sequence until one is final or `max_tries` is reached.
    ///
    /// Every attempt gets its own copy of the request and of `ext`. The extensions of the
    /// attempt that is handed back replace `ext`, keeping the caller's own scope.
    async fn execute_with_retry(
        &self,
        req: Request,
        next: Next<'_>,
        ext: &mut Extensions,
    ) -> Result<Response> {
        let caller_scope = ext.get::<Scope>().cloned();
        let outer = caller_scope.clone().unwrap_or_default();
        let mut secondary = self
            .config
            .secondary_host()
            .filter(|_| is_read_only(req.method()));
        let mut original = Some(req);

        let mut index = 0;
        let mut primary_tries = 0;
        let mut plan = self.plan(index, secondary.is_some(), &mut primary_tries);
        loop {
            let (target, delay) = plan;
            if let Some(err) = outer.error() {
                return Err(err.into());
            }
            let mut req = match original.as_ref().and_then(Request::try_clone) {
                Some(copy) => copy,
                None => match original.take() {
                    Some(req) if index == 0 => req,
                    _ => return Err(Error::middleware(RetryError::BodyNotRewindable)),
                },
            };
            if !delay.is_zero() {
                outer
                    .run(async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
            }

            if let (Target::Secondary, Some(host)) = (target, secondary) {
                host.apply(req.url_mut()).map_err(Error::middleware)?;
            }
            let timeout = outer
                .remaining()
                .map_or(self.config.try_timeout(), |left| {
                    left.min(self.config.try_timeout())
                });
            let timeout_secs = timeout_param_secs(timeout);
            set_timeout_param(req.url_mut(), timeout_secs);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt = index,
                %target,
                timeout_secs,
                url = %req.url(),
                "sending storage request"
            );

            let attempt_scope = outer.child_with_timeout(timeout);
            let mut attempt_ext = ext.clone();
            attempt_ext.insert(attempt_scope.clone());
            let result = attempt_scope
                .run(next.clone().run(req, &mut attempt_ext))
                .await;

            let retryable = if outer.is_done() {
                None
            } else {
                let attempt = Attempt {
                    index,
                    target,
                    timed_out: attempt_scope.error() == Some(ScopeError::DeadlineExceeded),
                };
                self.strategy.handle(&result, &attempt)
            };

            match retryable {
                Some(retryable)
                    if retryable.should_retry() && index + 1 < self.config.max_tries() =>
                {
                    attempt_scope.cancel();
                    if retryable == Retryable::NotReplicated {
                        secondary = None;
                        #[cfg(feature = "tracing")]
                        tracing::debug!(attempt = index, "secondary host disabled for this request");
                    }
                    index += 1;
                    plan = self.plan(index, secondary.is_some(), &mut primary_tries);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt = index - 1,
                        %target,
                        next_target = %plan.0,
                        delay = ?plan.1,
                        reason = retryable.reason(),
                        "retrying storage request"
                    );
                }
                Some(_) | None => {
                    match caller_scope {
                        Some(scope) => attempt_ext.insert(scope),
                        None => attempt_ext.remove::<Scope>(),
                    };
                    *ext = attempt_ext;
                    return match result {
                        Ok(mut resp) => {
                            resp.extensions_mut().insert(attempt_scope.guard());
                            Ok(resp)
                        }
                        Err(err) => {
                            attempt_scope.cancel();
                            Err(err)
                        }
                    };
                }
            }
        }
    }
}
