//! Incremental decoder and encoder for the DAP wire format.

use dapdrive_protocol::ProtocolMessage;
use thiserror::Error;

/// Errors produced while framing.
#[derive(Debug, Error)]
pub enum WireError {
    /// A message body exceeded the configured size cap.
    #[error("frame body of {length} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared body length.
        length: usize,
        /// Configured cap.
        max: usize,
    },
}

/// One item produced by [`MessageFramer::push`].
#[derive(Debug)]
pub enum FramerOutput {
    /// A complete, well-formed message.
    Message(ProtocolMessage),
    /// A frame whose body was not valid JSON. The frame is dropped and
    /// decoding continues with the next header block.
    ParseError {
        /// The serde error rendering.
        error: String,
    },
}

/// Maximum accepted body size. Adapters routinely send large variable
/// payloads; anything past this is treated as a broken peer.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Incremental DAP frame decoder.
///
/// Holds a receive buffer across calls. Each [`push`](Self::push) appends
/// the new chunk and extracts as many complete messages as the buffer
/// allows, so callers can feed reads of any size.
#[derive(Debug, Default)]
pub struct MessageFramer {
    buffer: Vec<u8>,
}

impl MessageFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes not yet consumed by a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a chunk and drains every complete message from the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] when a header declares a body
    /// beyond the size cap; the connection should be torn down at that
    /// point since the stream offset can no longer be trusted.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<FramerOutput>, WireError> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            let Some(header_end) = find_subslice(&self.buffer, b"\r\n\r\n") else {
                break;
            };
            let header_block = &self.buffer[..header_end];
            let body_start = header_end + 4;

            let Some(content_length) = parse_content_length(header_block) else {
                // Header block without Content-Length: drop it, keep the rest.
                self.buffer.drain(..body_start);
                continue;
            };
            if content_length > MAX_BODY_BYTES {
                return Err(WireError::FrameTooLarge { length: content_length, max: MAX_BODY_BYTES });
            }
            if self.buffer.len() < body_start + content_length {
                // Body not fully buffered yet.
                break;
            }

            let body = &self.buffer[body_start..body_start + content_length];
            match serde_json::from_slice::<ProtocolMessage>(body) {
                Ok(message) => out.push(FramerOutput::Message(message)),
                Err(err) => out.push(FramerOutput::ParseError { error: err.to_string() }),
            }
            self.buffer.drain(..body_start + content_length);
        }

        Ok(out)
    }
}

/// Serializes a message into a single wire-ready buffer: header line, blank
/// line and JSON body, intended to be written in one send.
pub fn encode_message(message: &ProtocolMessage) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Finds `needle` in `haystack`, returning the start offset.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Extracts the Content-Length value from a header block. Header names are
/// matched case-insensitively; unrecognized headers are ignored.
fn parse_content_length(header_block: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header_block).ok()?;
    for line in text.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            return value.trim().parse().ok();
        }
    }
    None
}
