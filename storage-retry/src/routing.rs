use std::fmt;
use std::time::Duration;

use reqwest::{Method, Url};

use crate::error::RetryError;

/// The endpoint an attempt is sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Primary,
    /// The read-only replica configured as [`RetryOptions::secondary_host`].
    ///
    /// [`RetryOptions::secondary_host`]: crate::RetryOptions::secondary_host
    Secondary,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Primary => f.write_str("primary"),
            Target::Secondary => f.write_str("secondary"),
        }
    }
}

/// A `host[:port]` authority that replaces the primary one on secondary attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryHost {
    host: String,
    port: Option<u16>,
}

impl SecondaryHost {
    pub(crate) fn parse(raw: &str) -> Result<Self, RetryError> {
        let invalid = |reason: String| RetryError::InvalidSecondaryHost {
            host: raw.to_string(),
            reason,
        };
        if raw.contains(|c: char| matches!(c, '/' | '?' | '#' | '@')) {
            return Err(invalid(
                "expected host[:port] without scheme, path, query or credentials".to_string(),
            ));
        }
        let url = Url::parse(&format!("http://{raw}/")).map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        Ok(SecondaryHost {
            host: host.to_string(),
            port: url.port(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Points `url` at this host. The port is replaced too, so a secondary host without a
    /// port uses the scheme's default.
    pub(crate) fn apply(&self, url: &mut Url) -> Result<(), RetryError> {
        let invalid = |reason: &str| RetryError::InvalidSecondaryHost {
            host: self.to_string(),
            reason: reason.to_string(),
        };
        url.set_host(Some(self.host.as_str()))
            .map_err(|e| invalid(&e.to_string()))?;
        url.set_port(self.port)
            .map_err(|()| invalid("request URL cannot carry a port"))
    }
}

impl fmt::Display for SecondaryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => f.write_str(&self.host),
        }
    }
}

/// Only reads can be served by the replica.
pub(crate) fn is_read_only(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// The per-try budget as the server sees it: whole seconds, rounded up, never zero.
pub(crate) fn timeout_param_secs(timeout: Duration) -> u64 {
    let secs = timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0));
    secs.max(1)
}

/// Sets the `timeout` query parameter, replacing any value already present.
pub(crate) fn set_timeout_param(url: &mut Url, seconds: u64) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| *key != "timeout")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("timeout", &seconds.to_string());
}
