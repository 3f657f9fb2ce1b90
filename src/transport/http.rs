//! Async transport on a pooled `reqwest::Client`.

use super::{join_url, timeout_error, AsyncTransport, Body, ByteStream, RawResponse};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::request::RequestSpec;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Default transport for [`crate::Client`].
///
/// Buffered calls get the configured timeout for the whole exchange.
/// Streaming calls get it for the response headers only, so long streams are
/// not cut off; chunk reads then wait as long as the server keeps the
/// connection open.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self::with_client(http, config))
    }

    /// Use a preconfigured reqwest client (proxies, custom TLS, ...).
    pub fn with_client(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            timeout: config.timeout,
        }
    }

    fn request(&self, spec: &RequestSpec) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(spec.method().clone(), join_url(&self.base_url, spec.path()))
            .headers(spec.headers().clone());
        if !spec.query().is_empty() {
            req = req.query(spec.query());
        }
        if let Some(body) = spec.body() {
            req = req.json(body);
        }
        req
    }
}

#[async_trait]
impl AsyncTransport for HttpTransport {
    async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse<ByteStream>, Error> {
        let req = self.request(spec);

        if !spec.is_stream() {
            let resp = req.timeout(self.timeout).send().await?;
            let status = resp.status().as_u16();
            let headers = resp.headers().clone();
            let bytes = resp.bytes().await?;
            debug!(status, bytes = bytes.len(), "response received");
            return Ok(RawResponse {
                status,
                headers,
                body: Body::Buffered(bytes),
            });
        }

        let resp = timeout(self.timeout, req.send())
            .await
            .map_err(|_| timeout_error(self.timeout))??;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        debug!(status, "stream opened");

        if !resp.status().is_success() {
            let bytes = timeout(self.timeout, resp.bytes())
                .await
                .map_err(|_| timeout_error(self.timeout))??;
            return Ok(RawResponse {
                status,
                headers,
                body: Body::Buffered(bytes),
            });
        }

        let stream: ByteStream = Box::pin(resp.bytes_stream().map_err(Error::from));
        Ok(RawResponse {
            status,
            headers,
            body: Body::Streaming(stream),
        })
    }
}
