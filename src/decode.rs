//! Response body decoding, buffered and incremental.

use crate::error::{classify, Error};
use crate::sse::{SseFrame, SseParser};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::trace;

/// Decode a buffered JSON body into `T`.
///
/// Malformed JSON and shape mismatches (missing required fields, wrong
/// primitive types) both surface as [`Error::Decode`].
pub fn json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    // An empty body reads as `null`, so unit and optional responses decode.
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };

    #[cfg(feature = "simd-json")]
    let parsed = {
        let mut scratch = body.to_vec();
        simd_json::from_slice::<T>(&mut scratch).map_err(|e| e.to_string())
    };

    #[cfg(not(feature = "simd-json"))]
    let parsed = serde_json::from_slice::<T>(body).map_err(|e| e.to_string());

    parsed.map_err(|e| Error::Decode(format!("{}: {e}", short_type_name::<T>())))
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Outcome of one decoding step.
#[derive(Debug, PartialEq)]
pub enum Step<T> {
    /// A decoded element.
    Item(T),
    /// No complete frame is buffered yet.
    Pending,
    /// The stream ended normally.
    End,
}

/// Incremental decoder turning SSE bytes into typed elements.
///
/// Each complete frame is decoded as soon as it is buffered. After the
/// `[DONE]` sentinel or the first error the decoder is finished and only
/// reports [`Step::End`], so a malformed frame is never followed by more items.
pub struct StreamDecoder<T> {
    parser: SseParser,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamDecoder<T> {
    pub fn new() -> Self {
        Self {
            parser: SseParser::new(),
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Feed raw bytes from the network.
    pub fn feed(&mut self, bytes: &[u8]) {
        if !self.finished {
            self.parser.feed(bytes);
        }
    }

    /// Decode the next buffered frame, if any.
    pub fn step(&mut self) -> Result<Step<T>, Error> {
        while !self.finished {
            let frame = match self.parser.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Step::Pending),
                Err(e) => return Err(self.fail(e)),
            };
            match self.decode_frame(frame) {
                Ok(Some(step)) => return Ok(step),
                Ok(None) => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(Step::End)
    }

    /// Signal that the byte source is exhausted and drain the remainder.
    ///
    /// Returns at most one more item; call repeatedly until [`Step::End`].
    pub fn end_of_input(&mut self) -> Result<Step<T>, Error> {
        match self.step()? {
            Step::Pending => {}
            other => return Ok(other),
        }

        let frame = match self.parser.finish() {
            Ok(frame) => frame,
            Err(e) => return Err(self.fail(e)),
        };
        let step = match frame {
            Some(frame) => self.decode_frame(frame),
            None => Ok(None),
        };
        self.finished = true;
        match step {
            Ok(Some(step)) => Ok(step),
            Ok(None) => Ok(Step::End),
            Err(e) => Err(e),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop decoding; later calls report [`Step::End`].
    pub fn close(&mut self) {
        self.finished = true;
        self.parser.reset();
    }

    fn fail(&mut self, e: Error) -> Error {
        self.close();
        e
    }

    fn decode_frame(&mut self, frame: SseFrame) -> Result<Option<Step<T>>, Error> {
        if frame.is_done() {
            trace!("stream sentinel received");
            self.finished = true;
            return Ok(Some(Step::End));
        }

        match frame.event.as_deref() {
            Some("error") => Err(stream_error(&frame.data)),
            Some("ping" | "heartbeat") => Ok(None),
            _ => {
                trace!(bytes = frame.data.len(), "decoding stream frame");
                json::<T>(frame.data.as_bytes()).map(|item| Some(Step::Item(item)))
            }
        }
    }
}

impl<T: DeserializeOwned> Default for StreamDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an `event: error` frame to an API error.
fn stream_error(data: &str) -> Error {
    let status = serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| {
            v["error"]["status"]
                .as_u64()
                .or_else(|| v["status"].as_u64())
        })
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| *s >= 400)
        .unwrap_or(500);
    classify(status, data)
}
