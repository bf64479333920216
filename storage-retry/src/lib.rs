//! Middleware to retry failed storage requests built on [`storage_pipeline`].
//!
//! [`RetryMiddleware`] resends requests that failed in a way that may resolve on its own:
//! throttling, transient 5xx statuses, dropped connections and attempts that ran out of
//! time. Delays between attempts follow an exponential or fixed curve with jitter. Reads can
//! additionally fail over to a read-only secondary host.
//!
//! ```
//! use std::time::Duration;
//! use storage_pipeline::{ClientBuilder, Scope};
//! use storage_retry::{RetryMiddleware, RetryOptions, RetryPolicyKind};
//!
//! async fn run() {
//!     let retry = RetryMiddleware::new(RetryOptions {
//!         policy: RetryPolicyKind::Exponential,
//!         max_tries: 4,
//!         try_timeout: Duration::from_secs(10),
//!         secondary_host: Some("account-secondary.blob.core.windows.net".to_string()),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!     let client = ClientBuilder::new(reqwest::Client::new()).with(retry).build();
//!
//!     let resp = client
//!         .get("https://account.blob.core.windows.net/container/blob")
//!         .scope(Scope::with_timeout(Duration::from_secs(60)))
//!         .send()
//!         .await
//!         .unwrap();
//!     println!("{}", resp.status());
//! }
//! ```
mod backoff;
mod error;
mod middleware;
#[cfg(test)]
mod mock_rng;
mod options;
mod retryable;
mod retryable_strategy;
mod routing;

pub use error::RetryError;
pub use middleware::RetryMiddleware;
pub use options::{RetryConfig, RetryOptions, RetryPolicyKind};
pub use retryable::Retryable;
pub use retryable_strategy::{
    default_on_request_failure, default_on_request_success, Attempt, DefaultRetryableStrategy,
    RetryableStrategy,
};
pub use routing::{SecondaryHost, Target};
