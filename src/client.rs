//! Async client.

use crate::auth::Credentials;
use crate::config::{ClientConfig, ConfigBuilder};
use crate::decode;
use crate::dispatch::Dispatch;
use crate::error::{from_response, Error};
use crate::pagination::Cursor;
use crate::request::{RequestBuilder, RequestSpec};
use crate::resources::{Account, Chat, Documents, Image, Market, Trends, Writer};
use crate::retry::{self, RetryPolicy};
use crate::stream::EventStream;
use crate::transport::{AsyncTransport, Body, ByteStream, HttpTransport, RawResponse};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client for the Nemati API.
///
/// Cloning is cheap: clones share credentials, configuration and the
/// connection pool, which is released when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    cancel: Option<CancellationToken>,
}

struct ClientInner {
    credentials: Credentials,
    config: ClientConfig,
    retry: RetryPolicy,
    transport: Arc<dyn AsyncTransport>,
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ConfigBuilder,
    transport: Option<Arc<dyn AsyncTransport>>,
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

    /// Set a custom base URL (useful for testing with mock servers).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.base_url(url);
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the maximum number of attempts per call, the first one included.
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

    /// Load the API key and base URL from the environment.
    pub fn from_env(mut self) -> Self {
        self.config = self.config.from_env();
        self
    }

    /// Replace the HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn AsyncTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client, Error> {
        let (credentials, config) = self.config.finish()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };

        debug!(base_url = %config.base_url, max_attempts = config.max_retries, "client ready");
        Ok(Client {
            inner: Arc::new(ClientInner {
                credentials,
                retry: config.retry_policy(),
                config,
                transport,
            }),
            cancel: None,
        })
    }
}

impl Client {
    /// Create a client with default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a client from environment variables.
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

    /// A view of this client whose calls and streams stop with
    /// [`Error::Cancelled`] once `token` fires.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel: Some(token),
        }
    }

    /// Start a request to an endpoint without a typed wrapper.
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
    pub async fn send<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, Error> {
        let body = retry::run(&self.inner.retry, spec, self.cancel.as_ref(), || async {
            let resp = self.exchange(spec).await?;
            buffer(resp.body).await
        })
        .await?;
        decode::json(&body)
    }

    /// Open a streaming request with retries.
    ///
    /// Retries only cover opening the stream. Once the first chunk has been
    /// handed out, failures end the stream instead.
    pub async fn send_stream<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
    ) -> Result<EventStream<T>, Error> {
        let resp = retry::run(&self.inner.retry, spec, self.cancel.as_ref(), || {
            self.exchange(spec)
        })
        .await?;

        let chunks: ByteStream = match resp.body {
            Body::Streaming(chunks) => chunks,
            Body::Buffered(bytes) => Box::pin(futures::stream::once(async move { Ok(bytes) })),
        };
        let events = EventStream::new(chunks);
        Ok(match &self.cancel {
            Some(token) => events.with_cancellation(token),
            None => events,
        })
    }

    /// Start a cursor over a paginated listing.
    pub fn cursor<T: DeserializeOwned>(&self, template: RequestSpec) -> Cursor<T> {
        Cursor::new(self.clone(), template)
    }

    /// One attempt: execute, then classify non-success statuses.
    async fn exchange(&self, spec: &RequestSpec) -> Result<RawResponse<ByteStream>, Error> {
        let resp = self.inner.transport.execute(spec).await?;
        if resp.is_success() {
            return Ok(resp);
        }
        let body = buffer(resp.body).await?;
        Err(from_response(resp.status, &resp.headers, &body))
    }
}

/// Collect a body into one buffer.
async fn buffer(body: Body<ByteStream>) -> Result<Bytes, Error> {
    match body {
        Body::Buffered(bytes) => Ok(bytes),
        Body::Streaming(chunks) => {
            let buf = chunks
                .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                    buf.extend_from_slice(&chunk);
                    Ok(buf)
                })
                .await?;
            Ok(buf.freeze())
        }
    }
}

impl Dispatch for Client {
    type Call<T: DeserializeOwned + Send + 'static> = BoxFuture<'static, Result<T, Error>>;
    type Stream<T: DeserializeOwned + Send + 'static> =
        BoxFuture<'static, Result<EventStream<T>, Error>>;
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
        let client = self.clone();
        Box::pin(async move {
            let spec = spec?;
            client.send(&spec).await
        })
    }

    fn stream<T: DeserializeOwned + Send + 'static>(
        &self,
        spec: Result<RequestSpec, Error>,
    ) -> Self::Stream<T> {
        let client = self.clone();
        Box::pin(async move {
            let spec = spec?;
            client.send_stream(&spec).await
        })
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
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}
