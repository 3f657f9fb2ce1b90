//! Single HTTP exchanges.
//!
//! A transport sends one [`RequestSpec`] and hands back the raw status,
//! headers and body. It does not retry, classify or decode; the clients layer
//! those on top, identically for both execution modes.

mod blocking;
mod http;

pub use blocking::BlockingHttpTransport;
pub use http::HttpTransport;

use crate::error::{Error, TransportErrorKind};
use crate::request::RequestSpec;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::HeaderMap;
use std::pin::Pin;
use std::time::Duration;

/// Chunks of a streaming body, pulled asynchronously.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Chunks of a streaming body, pulled by blocking reads.
pub type ByteChunks = Box<dyn Iterator<Item = Result<Bytes, Error>> + Send>;

/// Response payload: fully buffered, or a chunk source for streaming calls.
pub enum Body<S> {
    Buffered(Bytes),
    Streaming(S),
}

impl<S> std::fmt::Debug for Body<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
            Body::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// What came back from the server, before classification and decoding.
pub struct RawResponse<S> {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body<S>,
}

impl<S> std::fmt::Debug for RawResponse<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl<S> RawResponse<S> {
    pub fn buffered(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Buffered(body.into()),
        }
    }

    pub fn streaming(status: u16, body: S) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Streaming(body),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes requests without blocking the calling thread.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse<ByteStream>, Error>;
}

/// Executes requests on the calling thread.
pub trait BlockingTransport: Send + Sync {
    fn execute(&self, spec: &RequestSpec) -> Result<RawResponse<ByteChunks>, Error>;
}

pub(crate) fn timeout_error(limit: Duration) -> Error {
    Error::Transport {
        kind: TransportErrorKind::Timeout,
        message: format!("no response within {limit:?}"),
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
