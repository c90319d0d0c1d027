//! Streaming configuration.

use crate::error::{StreamError, StreamResult};
use chatflow_retries::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Environment variable holding the API base URL.
pub const BASE_URL_ENV: &str = "CHATFLOW_API_BASE_URL";
/// Environment variable overriding the inactivity timeout, in seconds.
pub const TIMEOUT_ENV: &str = "CHATFLOW_TIMEOUT_SECONDS";
/// Environment variable overriding the retry budget.
pub const MAX_RETRIES_ENV: &str = "CHATFLOW_MAX_RETRIES";

/// Default inactivity timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session delivery settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Deadline for the connect and for each chunk after it.
    pub timeout: Duration,
    /// Retry policy for transport failures.
    pub retry: RetryConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::for_streaming(),
        }
    }
}

impl StreamConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inactivity timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the retry budget, keeping the wait strategy.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.retry = self.retry.max_retries(n);
        self
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_retries() -> u32 {
    3
}

/// Client configuration, loadable from the environment or a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API.
    pub base_url: Url,
    /// Inactivity timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Maximum retries after transport failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ClientConfig {
    /// Create a config for a base URL with default delivery settings.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
        }
    }

    /// Load from `CHATFLOW_API_BASE_URL`, `CHATFLOW_TIMEOUT_SECONDS`, and
    /// `CHATFLOW_MAX_RETRIES`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if the base URL is missing or any
    /// variable fails to parse.
    pub fn from_env() -> StreamResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StreamResult<Self> {
        let raw = lookup(BASE_URL_ENV)
            .ok_or_else(|| StreamError::Configuration(format!("{} is not set", BASE_URL_ENV)))?;
        let base_url = Url::parse(&raw).map_err(|e| {
            StreamError::Configuration(format!("{} is not a valid URL: {}", BASE_URL_ENV, e))
        })?;

        let mut config = Self::new(base_url);
        if let Some(value) = lookup(TIMEOUT_ENV) {
            config.timeout_seconds = parse_var(TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(MAX_RETRIES_ENV) {
            config.max_retries = parse_var(MAX_RETRIES_ENV, &value)?;
        }
        Ok(config)
    }

    /// Delivery settings derived from this config.
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .max_retries(self.max_retries)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> StreamResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| StreamError::Configuration(format!("{} is invalid: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            (BASE_URL_ENV, "https://crm.example.com/api"),
            (TIMEOUT_ENV, "45"),
            (MAX_RETRIES_ENV, "5"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_str(), "https://crm.example.com/api");
        let stream = config.stream_config();
        assert_eq!(stream.timeout, Duration::from_secs(45));
        assert_eq!(stream.retry.max_retries, 5);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config =
            ClientConfig::from_lookup(lookup(&[(BASE_URL_ENV, "http://localhost:8080")])).unwrap();
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_from_lookup_errors() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[])),
            Err(StreamError::Configuration(_))
        ));
        assert!(ClientConfig::from_lookup(lookup(&[(BASE_URL_ENV, "not a url")])).is_err());
        assert!(ClientConfig::from_lookup(lookup(&[
            (BASE_URL_ENV, "http://localhost"),
            (MAX_RETRIES_ENV, "many"),
        ]))
        .is_err());
    }

    #[test]
    fn test_deserialize() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"https://crm.example.com"}"#).unwrap();
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.max_retries, 3);
    }
}
