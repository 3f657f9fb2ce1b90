//! Client configuration shared by the async and blocking clients.

use crate::auth::Credentials;
use crate::error::Error;
use crate::retry::RetryPolicy;
use std::env;
use std::time::Duration;

/// Production endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.nemati.ai/v1";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "NEMATI_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "NEMATI_BASE_URL";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Ceiling for a single attempt. Each retry gets a fresh budget.
    pub timeout: Duration,
    /// Maximum attempts per call, including the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Upper bound for the exponential part of the delay.
    pub backoff_max: Duration,
    /// Give POST/PATCH requests a generated idempotency key so they can be retried.
    pub auto_idempotency: bool,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            auto_idempotency: true,
            user_agent: concat!("nemati-rust/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Retry policy derived from the attempt cap and backoff bounds.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_base, self.backoff_max)
    }

    fn validate(&self) -> Result<(), Error> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be non-zero".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.backoff_max < self.backoff_base {
            return Err(Error::Config("backoff_max must be >= backoff_base".into()));
        }
        Ok(())
    }
}

/// Builder for both client flavours.
///
/// `Client::builder()` and `blocking::Client::builder()` wrap this and only
/// differ in what they build at the end.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    api_key: Option<String>,
    config: ClientConfig,
}

impl ConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of attempts per call.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Initial delay between retries.
    pub fn backoff_base(mut self, delay: Duration) -> Self {
        self.config.backoff_base = delay;
        self
    }

    /// Upper bound on the delay between retries.
    pub fn backoff_max(mut self, delay: Duration) -> Self {
        self.config.backoff_max = delay;
        self
    }

    /// Attach a generated idempotency key to POST/PATCH calls that have none.
    pub fn auto_idempotency(mut self, enabled: bool) -> Self {
        self.config.auto_idempotency = enabled;
        self
    }

    /// Override the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Load the API key and base URL from the environment.
    ///
    /// Values already set on the builder win.
    pub fn from_env(mut self) -> Self {
        if self.api_key.is_none() {
            if let Ok(key) = env::var(API_KEY_ENV) {
                self.api_key = Some(key);
            }
        }
        if self.config.base_url == DEFAULT_BASE_URL {
            if let Ok(url) = env::var(BASE_URL_ENV) {
                self = self.base_url(url);
            }
        }
        self
    }

    /// Validate and split into credentials and configuration.
    pub(crate) fn finish(self) -> Result<(Credentials, ClientConfig), Error> {
        let key = self
            .api_key
            .ok_or_else(|| Error::Config(format!("missing API key (set {API_KEY_ENV})")))?;
        let credentials = Credentials::new(key)?;
        self.config.validate()?;
        Ok((credentials, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 3);
        assert!(config.auto_idempotency);
    }

    #[test]
    fn test_builder_overrides() {
        let (creds, config) = ConfigBuilder::new()
            .api_key("nai_test_x")
            .base_url("http://localhost:8080/v1/")
            .timeout(Duration::from_secs(5))
            .max_retries(5)
            .backoff_base(Duration::from_millis(10))
            .backoff_max(Duration::from_millis(100))
            .finish()
            .unwrap();

        assert!(creds.is_test_key());
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_missing_key() {
        let err = ConfigBuilder::new().finish().unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains(API_KEY_ENV)));
    }

    #[test]
    fn test_invalid_config() {
        let bad = [
            ConfigBuilder::new().api_key("k").base_url("ftp://x"),
            ConfigBuilder::new().api_key("k").max_retries(0),
            ConfigBuilder::new().api_key("k").timeout(Duration::ZERO),
            ConfigBuilder::new()
                .api_key("k")
                .backoff_base(Duration::from_secs(10))
                .backoff_max(Duration::from_secs(1)),
        ];
        for builder in bad {
            assert!(matches!(builder.finish(), Err(Error::Config(_))));
        }
    }
}
