//! Newline-delimited JSON framing.
//!
//! Compact `serde_json` output never contains a raw `\n` byte, so a single
//! `0x0A` terminates every frame unambiguously. Decoding is driven by
//! [`feed`], a pure function over accumulated bytes; [`FrameDecoder`] wraps
//! it with the buffer a connection reader keeps between reads.

use crate::error::{DecodeError, FramingError, ProtocolError};
use crate::protocol::Message;

pub const DELIMITER: u8 = b'\n';

/// Longest partial frame kept while waiting for its delimiter.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Encodes one message as a self-delimiting frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, FramingError> {
    let mut frame = serde_json::to_vec(message).map_err(FramingError::Encode)?;
    frame.push(DELIMITER);
    Ok(frame)
}

/// Decodes every complete frame in `buffer`.
///
/// Returns one result per frame in stream order together with the bytes
/// after the last delimiter. A corrupt frame yields an error in its slot and
/// decoding carries on with the next one. If the unterminated tail already
/// exceeds [`MAX_FRAME_LEN`] it is reported as oversized and dropped.
pub fn feed(buffer: &[u8]) -> (Vec<Result<Message, DecodeError>>, &[u8]) {
    let mut results = Vec::new();
    let mut rest = buffer;

    while let Some(end) = rest.iter().position(|&b| b == DELIMITER) {
        let line = trim_line(&rest[..end]);
        rest = &rest[end + 1..];

        if line.is_empty() {
            continue;
        }
        results.push(decode_frame(line));
    }

    if rest.len() > MAX_FRAME_LEN {
        results.push(Err(FramingError::Oversized {
            limit: MAX_FRAME_LEN,
            discarded: rest.len(),
        }
        .into()));
        rest = &rest[rest.len()..];
    }

    (results, rest)
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

/// Decodes a single frame body (without its delimiter).
pub fn decode_frame(frame: &[u8]) -> Result<Message, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_slice(frame).map_err(FramingError::Malformed)?;
    let message = serde_json::from_value(value)
        .map_err(|e| ProtocolError::Invalid(e.to_string()))?;
    Ok(message)
}

/// Incremental decoder holding the unconsumed tail between reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes and returns every frame they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Message, DecodeError>> {
        self.buffer.extend_from_slice(bytes);

        let (results, consumed) = {
            let (results, rest) = feed(&self.buffer);
            (results, self.buffer.len() - rest.len())
        };
        self.buffer.drain(..consumed);

        results
    }

    /// Bytes buffered for a frame whose delimiter has not arrived yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
