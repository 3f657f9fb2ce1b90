//! Incremental SSE (Server-Sent Events) frame parser.
//!
//! Handles:
//! - Partial frames across TCP chunks
//! - Multi-line data fields
//! - CRLF and LF line endings
//! - Comment lines and unknown fields
//! - Buffer compaction to prevent unbounded growth

use crate::error::Error;
use bytes::{Buf, BytesMut};
use memchr::memchr;

/// Data payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    /// True for the frame that terminates a stream.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

/// Line-based SSE parser.
///
/// Bytes go in with [`feed`](SseParser::feed); every complete frame comes out
/// of [`next_frame`](SseParser::next_frame) as soon as its terminating blank
/// line has arrived, never waiting for later frames.
pub struct SseParser {
    buffer: BytesMut,
    /// Offset of unconsumed data in buffer.
    consumed: usize,
}

impl SseParser {
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(cap),
            consumed: 0,
        }
    }

    /// Feed bytes into the parser.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed more than half
        if self.consumed > self.buffer.len() / 2 && self.consumed > 4096 {
            self.compact();
        }
        self.buffer.extend_from_slice(data);
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buffer.advance(self.consumed);
            self.consumed = 0;
        }
    }

    /// Parse the next complete frame.
    ///
    /// `Ok(None)` means more data is needed. Frames without a data field are
    /// skipped, as the SSE dispatch rules require. A line that is not valid
    /// UTF-8 is an error.
    pub fn next_frame(&mut self) -> Result<Option<SseFrame>, Error> {
        loop {
            let buf = &self.buffer[self.consumed..];
            let Some(end) = frame_end(buf) else {
                return Ok(None);
            };

            let frame = parse_block(&buf[..end.body])?;
            self.consumed += end.total;

            if let Some(frame) = frame {
                return Ok(Some(frame));
            }
        }
    }

    /// Flush whatever is left once the byte source is exhausted.
    ///
    /// A trailing frame that lacks only its blank line is still dispatched;
    /// anything that does not end on a line boundary means the stream was cut.
    pub fn finish(&mut self) -> Result<Option<SseFrame>, Error> {
        if let Some(frame) = self.next_frame()? {
            return Ok(Some(frame));
        }

        let rest = &self.buffer[self.consumed..];
        if rest.iter().all(|b| matches!(b, b'\r' | b'\n')) {
            self.reset();
            return Ok(None);
        }
        if !rest.ends_with(b"\n") {
            let len = rest.len();
            self.reset();
            return Err(Error::Decode(format!(
                "stream truncated inside a frame ({len} bytes pending)"
            )));
        }

        let frame = parse_block(rest)?;
        self.reset();
        Ok(frame)
    }

    /// Check if the data indicates end of stream (e.g., `[DONE]`).
    #[inline]
    pub fn is_done(data: &str) -> bool {
        data.trim() == DONE_SENTINEL
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.consumed = 0;
    }

    /// Bytes received but not yet dispatched.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len() - self.consumed
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

struct FrameEnd {
    /// Length of the frame's lines, excluding the blank line.
    body: usize,
    /// Bytes to consume, including the blank line.
    total: usize,
}

/// Find the blank line closing the first frame in `buf`.
fn frame_end(buf: &[u8]) -> Option<FrameEnd> {
    let mut pos = 0;
    while pos < buf.len() {
        let line_end = pos + memchr(b'\n', &buf[pos..])?;
        let line = &buf[pos..line_end];
        if line.is_empty() || line == b"\r" {
            return Some(FrameEnd {
                body: pos,
                total: line_end + 1,
            });
        }
        pos = line_end + 1;
    }
    None
}

/// Parse the field lines of one frame.
fn parse_block(block: &[u8]) -> Result<Option<SseFrame>, Error> {
    let mut data: Option<String> = None;
    let mut event = None;
    let mut id = None;

    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() || line[0] == b':' {
            // Comments (keep-alives) carry no data.
            continue;
        }

        let line = std::str::from_utf8(line)
            .map_err(|e| Error::Decode(format!("stream frame is not UTF-8: {e}")))?;
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                let data = data.get_or_insert_with(String::new);
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" => event = Some(value.to_string()),
            "id" => id = Some(value.to_string()),
            _ => {} // retry and unknown fields are ignored
        }
    }

    Ok(data.map(|data| SseFrame { event, data, id }))
}
