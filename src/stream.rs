//! Async consumption of streaming responses.

use crate::decode::{Step, StreamDecoder};
use crate::error::Error;
use crate::transport::ByteStream;
use bytes::Bytes;
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

/// A streaming response read from the network.
pub type EventStream<T> = SseStream<T, ByteStream>;

pin_project! {
    /// A streaming response.
    ///
    /// Yields one decoded element per server frame, in server order, and ends
    /// with `None` once the `[DONE]` sentinel arrives. A decoding or transport
    /// error is yielded once and also ends the stream, so a normal end and a
    /// failure are never confused. The stream cannot be restarted; issue a new
    /// request to read it again.
    pub struct SseStream<T, S> {
        #[pin]
        inner: Option<S>,
        decoder: StreamDecoder<T>,
        cancel: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
        items: usize,
        done: bool,
    }
}

impl<T, S> SseStream<T, S>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes, Error>>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            decoder: StreamDecoder::new(),
            cancel: None,
            items: 0,
            done: false,
        }
    }

    /// Stop the stream with [`Error::Cancelled`] once `token` fires.
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.cancel = Some(Box::pin(token.clone().cancelled_owned()));
        self
    }

    /// Check if stream is done.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of elements yielded so far.
    pub fn items_received(&self) -> usize {
        self.items
    }
}

impl<T, S> SseStream<T, S>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes, Error>> + Unpin,
{
    /// Get the next element from the stream.
    pub async fn next(&mut self) -> Option<Result<T, Error>> {
        futures::StreamExt::next(self).await
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<T>, Error> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }
}

impl<T, S> Stream for SseStream<T, S>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes, Error>>,
{
    type Item = Result<T, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(None);
        }

        if let Some(cancel) = this.cancel.as_mut() {
            if cancel.as_mut().poll(cx).is_ready() {
                debug!(items = *this.items, "stream cancelled");
                *this.done = true;
                *this.cancel = None;
                this.decoder.close();
                // Dropping the body closes the connection.
                this.inner.set(None);
                return Poll::Ready(Some(Err(Error::Cancelled)));
            }
        }

        loop {
            let step = match this.decoder.step() {
                Ok(Step::Pending) => None,
                other => Some(other),
            };

            let step = match step {
                Some(step) => step,
                None => match this.inner.as_mut().as_pin_mut() {
                    Some(inner) => match ready!(inner.poll_next(cx)) {
                        Some(Ok(bytes)) => {
                            this.decoder.feed(&bytes);
                            continue;
                        }
                        Some(Err(e)) => Err(e),
                        None => {
                            this.inner.set(None);
                            this.decoder.end_of_input()
                        }
                    },
                    None => this.decoder.end_of_input(),
                },
            };

            return match step {
                Ok(Step::Item(item)) => {
                    *this.items += 1;
                    Poll::Ready(Some(Ok(item)))
                }
                Ok(Step::End | Step::Pending) => {
                    debug!(items = *this.items, "stream finished");
                    *this.done = true;
                    *this.cancel = None;
                    this.inner.set(None);
                    Poll::Ready(None)
                }
                Err(e) => {
                    debug!(items = *this.items, error = %e, "stream failed");
                    *this.done = true;
                    *this.cancel = None;
                    this.decoder.close();
                    this.inner.set(None);
                    Poll::Ready(Some(Err(e)))
                }
            };
        }
    }
}

impl<T, S> std::fmt::Debug for SseStream<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream")
            .field("items", &self.items)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
