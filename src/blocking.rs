//! Blocking client.
//!
//! Same endpoints, configuration and error semantics as the async
//! [`crate::Client`], executed on the calling thread. Must not be used from
//! within an async runtime.
//!
//! ```no_run
//! use nemati::blocking::Client;
//! use nemati::resources::{ChatMessage, ChatRequest};
//!
//! # fn main() -> nemati::Result<()> {
//! let client = Client::from_env()?;
//! let request = ChatRequest::new(vec![ChatMessage::user("Write a haiku about coding.")]);
//! for chunk in client.chat().create_stream(&request)? {
//!     print!("{}", chunk?.content);
//! }
//! # Ok(())
//! # }
//! ```

use crate::auth::Credentials;
use crate::config::{ClientConfig, ConfigBuilder};
use crate::decode::{self, Step, StreamDecoder};
use crate::dispatch::Dispatch;
use crate::error::{from_response, Error};
use crate::pagination::{CursorState, Page};
use crate::request::{RequestBuilder, RequestSpec};
use crate::resources::{Account, Chat, Documents, Image, Market, Trends, Writer};
use crate::retry::{self, RetryPolicy};
use crate::transport::{BlockingHttpTransport, BlockingTransport, Body, ByteChunks, RawResponse};
use bytes::{Bytes, BytesMut};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Blocking client for the Nemati API.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    credentials: Credentials,
    config: ClientConfig,
    retry: RetryPolicy,
    transport: Arc<dyn BlockingTransport>,
}

/// Builder for the blocking [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ConfigBuilder,
    transport: Option<Arc<dyn BlockingTransport>>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config = self.config.api_key(key);
        self
    }

    /// Override the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.base_url(url);
        self
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Maximum attempts per call, counting the first.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config = self.config.max_retries(retries);
        self
    }

    /// Initial delay between retries.
    pub fn backoff_base(mut self, delay: Duration) -> Self {
        self.config = self.config.backoff_base(delay);
        self
    }

    /// Upper bound on the delay between retries.
    pub fn backoff_max(mut self, delay: Duration) -> Self {
        self.config = self.config.backoff_max(delay);
        self
    }

    /// Attach a generated idempotency key to POST/PATCH calls that have none.
    pub fn auto_idempotency(mut self, enabled: bool) -> Self {
        self.config = self.config.auto_idempotency(enabled);
        self
    }

    /// Override the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config = self.config.user_agent(agent);
        self
    }

    /// Fill unset values from `NEMATI_API_KEY` and `NEMATI_BASE_URL`.
    pub fn from_env(mut self) -> Self {
        self.config = self.config.from_env();
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, Error> {
        let (credentials, config) = self.config.finish()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(BlockingHttpTransport::new(&config)?),
        };

        debug!(base_url = %config.base_url, max_attempts = config.max_retries, "blocking client ready");
        Ok(Client {
            inner: Arc::new(ClientInner {
                credentials,
                retry: config.retry_policy(),
                config,
                transport,
            }),
        })
    }
}

impl Client {
    /// Create a client with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a client from `NEMATI_API_KEY` and `NEMATI_BASE_URL`.
    pub fn from_env() -> Result<Self, Error> {
        ClientBuilder::new().from_env().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Start a request against an arbitrary endpoint.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        RequestSpec::builder(method, path)
    }

    /// Chat completions.
    pub fn chat(&self) -> Chat<'_, Self> {
        Chat::new(self)
    }

    /// Content generation and templates.
    pub fn writer(&self) -> Writer<'_, Self> {
        Writer::new(self)
    }

    /// Image generation and editing.
    pub fn image(&self) -> Image<'_, Self> {
        Image::new(self)
    }

    /// Trend search and YouTube trends.
    pub fn trends(&self) -> Trends<'_, Self> {
        Trends::new(self)
    }

    /// Stock and crypto quotes.
    pub fn market(&self) -> Market<'_, Self> {
        Market::new(self)
    }

    /// Document upload, listing and chat.
    pub fn documents(&self) -> Documents<'_, Self> {
        Documents::new(self)
    }

    /// Account details, credits and limits.
    pub fn account(&self) -> Account<'_, Self> {
        Account::new(self)
    }

    /// Run a buffered request with retries and decode the body.
    pub fn send<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, Error> {
        let body = retry::run_blocking(&self.inner.retry, spec, || {
            let resp = self.exchange(spec)?;
            buffer(resp.body)
        })?;
        decode::json(&body)
    }

    /// Open a streaming request with retries.
    pub fn send_stream<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<EventIter<T>, Error> {
        let resp = retry::run_blocking(&self.inner.retry, spec, || self.exchange(spec))?;
        let chunks: ByteChunks = match resp.body {
            Body::Streaming(chunks) => chunks,
            Body::Buffered(bytes) => Box::new(std::iter::once(Ok(bytes))),
        };
        Ok(EventIter::new(chunks))
    }

    /// Page through a list endpoint, starting from `template`.
    pub fn cursor<T: DeserializeOwned>(&self, template: RequestSpec) -> Cursor<T> {
        Cursor {
            client: self.clone(),
            template,
            state: CursorState::default(),
            pages: 0,
            _marker: PhantomData,
        }
    }

    fn exchange(&self, spec: &RequestSpec) -> Result<RawResponse<ByteChunks>, Error> {
        let resp = self.inner.transport.execute(spec)?;
        if resp.is_success() {
            return Ok(resp);
        }
        let body = buffer(resp.body)?;
        Err(from_response(resp.status, &resp.headers, &body))
    }
}

fn buffer(body: Body<ByteChunks>) -> Result<Bytes, Error> {
    match body {
        Body::Buffered(bytes) => Ok(bytes),
        Body::Streaming(chunks) => {
            let mut buf = BytesMut::new();
            for chunk in chunks {
                buf.extend_from_slice(&chunk?);
            }
            Ok(buf.freeze())
        }
    }
}

impl Dispatch for Client {
    type Call<T: DeserializeOwned + Send + 'static> = Result<T, Error>;
    type Stream<T: DeserializeOwned + Send + 'static> = Result<EventIter<T>, Error>;
    type Pages<T: DeserializeOwned + Send + 'static> = Result<Cursor<T>, Error>;

    fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn call<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Call<T> {
        self.send(&spec?)
    }

    fn stream<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Stream<T> {
        self.send_stream(&spec?)
    }

    fn paginate<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Pages<T> {
        spec.map(|spec| self.cursor(spec))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("credentials", &self.inner.credentials)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// A streaming response read on the calling thread.
///
/// Yields one decoded element per server frame. A decoding or transport
/// error is yielded once and ends the iteration. Dropping the iterator
/// closes the connection.
pub struct EventIter<T> {
    chunks: Option<ByteChunks>,
    decoder: StreamDecoder<T>,
    items: usize,
    done: bool,
}

impl<T: DeserializeOwned> EventIter<T> {
    /// Decode frames from a chunk source.
    pub fn new(chunks: ByteChunks) -> Self {
        Self {
            chunks: Some(chunks),
            decoder: StreamDecoder::new(),
            items: 0,
            done: false,
        }
    }

    /// Whether the stream has ended.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of elements yielded so far.
    pub fn items_received(&self) -> usize {
        self.items
    }

    fn pull(&mut self) -> Result<Step<T>, Error> {
        loop {
            match self.decoder.step()? {
                Step::Pending => {}
                other => return Ok(other),
            }
            let next = match self.chunks.as_mut() {
                Some(chunks) => chunks.next(),
                None => return self.decoder.end_of_input(),
            };
            match next {
                Some(chunk) => self.decoder.feed(&chunk?),
                None => {
                    self.chunks = None;
                    return self.decoder.end_of_input();
                }
            }
        }
    }
}

impl<T: DeserializeOwned> Iterator for EventIter<T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(Step::Item(item)) => {
                self.items += 1;
                Some(Ok(item))
            }
            Ok(Step::End | Step::Pending) => {
                debug!(items = self.items, "stream finished");
                self.done = true;
                self.chunks = None;
                None
            }
            Err(e) => {
                debug!(items = self.items, error = %e, "stream failed");
                self.done = true;
                self.chunks = None;
                self.decoder.close();
                Some(Err(e))
            }
        }
    }
}

impl<T: DeserializeOwned> FusedIterator for EventIter<T> {}

impl<T> std::fmt::Debug for EventIter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIter")
            .field("items", &self.items)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Blocking counterpart of [`crate::pagination::Cursor`].
pub struct Cursor<T> {
    client: Client,
    template: RequestSpec,
    state: CursorState,
    pages: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Cursor<T> {
    /// Fetch the next page, or `None` after the last one.
    pub fn next_page(&mut self) -> Result<Option<Page<T>>, Error> {
        let Some(spec) = self.state.next_spec(&self.template) else {
            return Ok(None);
        };

        let page: Page<T> = self.client.send(&spec)?;
        self.pages += 1;
        debug!(
            path = spec.path(),
            page = self.pages,
            items = page.items.len(),
            more = page.has_next(),
            "page received"
        );
        self.state.advance(page.next_cursor.as_deref())?;
        Ok(Some(page))
    }

    /// Whether the last page has been fetched.
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Fetch every remaining page and concatenate the items.
    pub fn collect_all(self) -> Result<Vec<T>, Error> {
        self.into_items().collect()
    }

    /// Iterate over items, fetching pages as they are needed. Stops after
    /// the first error.
    pub fn into_items(self) -> Items<T> {
        Items {
            cursor: self,
            buffered: VecDeque::new(),
            failed: false,
        }
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("path", &self.template.path())
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

/// Items of a blocking [`Cursor`], across pages.
#[derive(Debug)]
pub struct Items<T> {
    cursor: Cursor<T>,
    buffered: VecDeque<T>,
    failed: bool,
}

impl<T: DeserializeOwned> Iterator for Items<T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.failed {
                return None;
            }
            match self.cursor.next_page() {
                Ok(Some(page)) => self.buffered.extend(page.items),
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<T: DeserializeOwned> FusedIterator for Items<T> {}
