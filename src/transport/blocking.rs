//! Blocking transport on `reqwest::blocking::Client`.

use super::{join_url, BlockingTransport, Body, ByteChunks, RawResponse};
use crate::config::ClientConfig;
use crate::error::{Error, TransportErrorKind};
use crate::request::RequestSpec;
use bytes::Bytes;
use std::io::{self, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

const READ_CHUNK: usize = 8192;

/// Default transport for [`crate::blocking::Client`].
///
/// Buffered calls are bounded by the configured timeout. Streaming calls are
/// bounded until the response headers arrive; reads after that cannot be
/// interrupted.
#[derive(Clone)]
pub struct BlockingHttpTransport {
    http: reqwest::blocking::Client,
    base_url: String,
    timeout: Duration,
}

impl BlockingHttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::blocking::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .connect_timeout(config.timeout)
            .timeout(None)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            timeout: config.timeout,
        })
    }
}

impl BlockingTransport for BlockingHttpTransport {
    fn execute(&self, spec: &RequestSpec) -> Result<RawResponse<ByteChunks>, Error> {
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
        let resp = if spec.is_stream() {
            send_within(req, self.timeout)?
        } else {
            req.timeout(self.timeout).send()?
        };
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();

        if spec.is_stream() && resp.status().is_success() {
            debug!(status, "stream opened");
            let chunks: ByteChunks = Box::new(ReadChunks::new(resp));
            return Ok(RawResponse {
                status,
                headers,
                body: Body::Streaming(chunks),
            });
        }

        let bytes = resp.bytes()?;
        debug!(status, bytes = bytes.len(), "response received");
        Ok(RawResponse {
            status,
            headers,
            body: Body::Buffered(bytes),
        })
    }
}

/// Send on a worker thread and wait at most `limit` for the response headers.
///
/// On timeout the worker is left to finish on its own; a late response is
/// dropped, which closes the connection.
fn send_within(
    req: reqwest::blocking::RequestBuilder,
    limit: Duration,
) -> Result<reqwest::blocking::Response, Error> {
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("nemati-stream-open".into())
        .spawn(move || {
            let _ = tx.send(req.send());
        })
        .map_err(|e| Error::Transport {
            kind: TransportErrorKind::Other,
            message: format!("failed to spawn request thread: {e}"),
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => Ok(result?),
        Err(RecvTimeoutError::Timeout) => Err(Error::Transport {
            kind: TransportErrorKind::Timeout,
            message: format!("no response headers within {limit:?}"),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(Error::Transport {
            kind: TransportErrorKind::Other,
            message: "request thread exited without a response".into(),
        }),
    }
}

/// Adapts a reader into an iterator of chunks, each as large as one read.
pub(crate) struct ReadChunks<R> {
    reader: R,
    buf: Box<[u8]>,
    done: bool,
}

impl<R: Read> ReadChunks<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0; READ_CHUNK].into_boxed_slice(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for ReadChunks<R> {
    type Item = Result<Bytes, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => return Some(Ok(Bytes::copy_from_slice(&self.buf[..n]))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(io_error(&e)));
                }
            }
        }
    }
}

fn io_error(e: &io::Error) -> Error {
    let kind = match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => TransportErrorKind::Connect,
        _ => TransportErrorKind::Other,
    };
    Error::Transport {
        kind,
        message: e.to_string(),
    }
}
