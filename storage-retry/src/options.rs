use std::time::Duration;

use crate::error::RetryError;
use crate::routing::SecondaryHost;

const DEFAULT_MAX_TRIES: u32 = 4;
const DEFAULT_TRY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXPONENTIAL_RETRY_DELAY: Duration = Duration::from_secs(4);
const DEFAULT_FIXED_RETRY_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(120);

/// How the delay before a primary attempt grows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPolicyKind {
    /// `retry_delay * (2^(n-1) - 1)` before the n-th primary attempt.
    #[default]
    Exponential,
    /// `retry_delay` before every primary attempt but the first.
    Fixed,
}

/// Retry settings as supplied by the user.
///
/// Zero values mean "use the default", so `RetryOptions::default()` gives four tries, a 30s
/// per-try timeout, and exponential backoff from 4s capped at 120s.
///
/// ```
/// use std::time::Duration;
/// use storage_retry::{RetryOptions, RetryPolicyKind};
///
/// let options = RetryOptions {
///     policy: RetryPolicyKind::Fixed,
///     max_tries: 3,
///     secondary_host: Some("account-secondary.blob.core.windows.net".to_string()),
///     ..Default::default()
/// };
/// let config = options.validate().unwrap();
/// assert_eq!(config.retry_delay(), Duration::from_secs(30));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryOptions {
    pub policy: RetryPolicyKind,
    /// Total number of attempts, including the first one.
    pub max_tries: u32,
    /// Upper bound on a single attempt. The server is told about it through the `timeout`
    /// query parameter.
    pub try_timeout: Duration,
    /// Base delay for `policy`. Must be zero exactly when `max_retry_delay` is.
    pub retry_delay: Duration,
    /// Cap on any single delay, jitter included.
    pub max_retry_delay: Duration,
    /// Read-only replica (`host[:port]`) that GET and HEAD requests alternate with while
    /// retrying.
    pub secondary_host: Option<String>,
}

impl RetryOptions {
    /// Checks the options and fills in defaults.
    pub fn validate(self) -> Result<RetryConfig, RetryError> {
        let (retry_delay, max_retry_delay) = match (self.retry_delay, self.max_retry_delay) {
            (Duration::ZERO, Duration::ZERO) => {
                let retry_delay = match self.policy {
                    RetryPolicyKind::Exponential => DEFAULT_EXPONENTIAL_RETRY_DELAY,
                    RetryPolicyKind::Fixed => DEFAULT_FIXED_RETRY_DELAY,
                };
                (retry_delay, DEFAULT_MAX_RETRY_DELAY)
            }
            (retry_delay, max_retry_delay)
                if retry_delay.is_zero() || max_retry_delay.is_zero() =>
            {
                return Err(RetryError::InconsistentDelays {
                    retry_delay,
                    max_retry_delay,
                });
            }
            delays => delays,
        };

        let secondary_host = match self.secondary_host.as_deref() {
            None | Some("") => None,
            Some(host) => Some(SecondaryHost::parse(host)?),
        };

        Ok(RetryConfig {
            policy: self.policy,
            max_tries: if self.max_tries == 0 {
                DEFAULT_MAX_TRIES
            } else {
                self.max_tries
            },
            try_timeout: if self.try_timeout.is_zero() {
                DEFAULT_TRY_TIMEOUT
            } else {
                self.try_timeout
            },
            retry_delay,
            max_retry_delay,
            secondary_host,
        })
    }
}

/// Validated, immutable retry settings. Built with [`RetryOptions::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    policy: RetryPolicyKind,
    max_tries: u32,
    try_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
    secondary_host: Option<SecondaryHost>,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicyKind {
        self.policy
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn try_timeout(&self) -> Duration {
        self.try_timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    pub fn secondary_host(&self) -> Option<&SecondaryHost> {
        self.secondary_host.as_ref()
    }
}

impl TryFrom<RetryOptions> for RetryConfig {
    type Error = RetryError;

    fn try_from(options: RetryOptions) -> Result<Self, Self::Error> {
        options.validate()
    }
}
