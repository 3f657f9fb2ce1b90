//! API key handling.

use crate::error::Error;
use reqwest::header::HeaderValue;
use std::fmt;
use std::sync::Arc;

/// The API key a client authenticates with.
///
/// Immutable once created and never printed: `Debug` shows only a redacted
/// form so keys cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: Arc<str>,
}

impl Credentials {
    /// Wrap an API key, rejecting blank ones.
    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config("API key is empty".into()));
        }
        if key.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(Error::Config("API key contains whitespace".into()));
        }
        Ok(Self { key: Arc::from(key) })
    }

    /// Value for the `Authorization` header, marked sensitive so reqwest and
    /// hyper keep it out of their own debug output.
    pub(crate) fn header_value(&self) -> Result<HeaderValue, Error> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.key))
            .map_err(|_| Error::Config("API key is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Live keys look like `nai_live_...`, test keys like `nai_test_...`.
    pub fn is_test_key(&self) -> bool {
        self.key.starts_with("nai_test_")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.key.chars().take(4).collect();
        write!(f, "Credentials({prefix}***)")
    }
}
