use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, or DNS failure.
    Connect,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Any other I/O failure while sending or reading.
    Other,
}

/// Fieldless mirror of [`Error`] for branching and matching in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Validation`].
    Validation,
    /// See [`Error::Auth`].
    Auth,
    /// See [`Error::RateLimited`].
    RateLimited,
    /// See [`Error::NotFound`].
    NotFound,
    /// See [`Error::Api`].
    Api,
    /// See [`Error::Transport`].
    Transport,
    /// See [`Error::Decode`].
    Decode,
    /// See [`Error::RetryExhausted`].
    RetryExhausted,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::Config`].
    Config,
}

/// Every failure the client can surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Call arguments were rejected before anything was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Credentials were rejected (401/403).
    #[error("unauthorized ({status}): {message}")]
    Auth {
        status: u16,
        message: String,
        body: String,
    },

    /// Rate limited (429). Check `retry_after` for the server's hint.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
        body: String,
    },

    /// The addressed resource does not exist (404).
    #[error("not found: {message}")]
    NotFound { message: String, body: String },

    /// Any other 4xx/5xx, or an error event sent mid-stream.
    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
        body: String,
    },

    /// No response was received.
    #[error("transport ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// The response body or a stream frame was malformed.
    #[error("decode: {0}")]
    Decode(String),

    /// The last retryable error after the attempt cap was reached.
    #[error("gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The caller cancelled the call.
    #[error("cancelled")]
    Cancelled,

    /// Invalid client configuration.
    #[error("config: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the retry policy may try again after this error.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited { .. } | Error::Transport { .. } => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Fieldless kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Auth { .. } => ErrorKind::Auth,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Api { .. } => ErrorKind::Api,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Decode(_) => ErrorKind::Decode,
            Error::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status behind this error, looking through `RetryExhausted`.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. } | Error::Api { status, .. } => Some(*status),
            Error::RateLimited { .. } => Some(429),
            Error::NotFound { .. } => Some(404),
            Error::RetryExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Server-supplied wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } | Error::Api { retry_after, .. } => *retry_after,
            Error::RetryExhausted { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// Attach a `Retry-After` hint to the variants that carry one.
    pub fn with_retry_after(mut self, hint: Option<Duration>) -> Self {
        if let Error::RateLimited { retry_after, .. } | Error::Api { retry_after, .. } = &mut self {
            *retry_after = hint;
        }
        self
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            return Error::Validation(e.to_string());
        }
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Error::Transport {
            kind,
            message: e.to_string(),
        }
    }
}

/// Map a non-success status and its body to an [`Error`].
///
/// Pure: no I/O and no state, so the mapping can be checked against a table.
pub fn classify(status: u16, body: &str) -> Error {
    let message = extract_message(status, body);
    let body = body.to_string();

    match status {
        401 | 403 => Error::Auth {
            status,
            message,
            body,
        },
        404 => Error::NotFound { message, body },
        429 => Error::RateLimited {
            message,
            retry_after: None,
            body,
        },
        _ => Error::Api {
            status,
            message,
            retry_after: None,
            body,
        },
    }
}

/// Classify a response, including the `Retry-After` header.
pub(crate) fn from_response(status: u16, headers: &HeaderMap, body: &[u8]) -> Error {
    let body = String::from_utf8_lossy(body);
    classify(status, &body).with_retry_after(parse_retry_after(headers))
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs = value.parse::<f64>().ok()?;
    // Rejects negative, NaN and values past `Duration::MAX`.
    Duration::try_from_secs_f64(secs).ok()
}

fn extract_message(status: u16, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let candidates = [
            &v["error"]["message"],
            &v["error"],
            &v["message"],
            &v["detail"],
        ];
        if let Some(msg) = candidates.iter().find_map(|c| c.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown error")
        .to_string()
}
