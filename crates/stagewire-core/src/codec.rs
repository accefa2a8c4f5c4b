//! Newline-delimited JSON framing for [`StreamEvent`].
//!
//! The encoder relies on `serde_json` escaping control characters, so an
//! encoded payload never contains a raw `\n` and the delimiter is unambiguous.

use crate::errors::{ProtocolError, preview};
use crate::event::StreamEvent;

/// Content type of an encoded event stream.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

const PREVIEW_CHARS: usize = 80;

/// Encodes one event as a single line terminated by `\n`.
pub fn encode_line(event: &StreamEvent) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(event).map_err(ProtocolError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Incremental line framer.
///
/// Transport chunks are not aligned with event boundaries; bytes are buffered
/// until a newline arrives. Splitting on the `\n` byte is UTF-8 safe because
/// that byte never occurs inside a multi-byte sequence.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and decodes every complete line now in the buffer.
    ///
    /// Blank lines are skipped. A line that fails to decode is returned as an
    /// `Err` item; decoding continues with the next line.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, ProtocolError>> {
        self.buf.extend_from_slice(chunk);
        let mut decoded = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            if let Some(result) = decode_line(&self.buf[start..end]) {
                decoded.push(result);
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        decoded
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Drops buffered state. Used on abort.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    /// Ends decoding. An unterminated trailing line is discarded; the number
    /// of dropped bytes is returned.
    pub fn finish(self) -> usize {
        self.buf.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<StreamEvent, ProtocolError>> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(line).map_err(|source| ProtocolError::Decode {
            preview: preview(line, PREVIEW_CHARS),
            source,
        }),
    )
}
