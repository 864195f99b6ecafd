//! Content-Length framing for DAP byte streams.
//!
//! The Debug Adapter Protocol frames every JSON message with one or more
//! `Header: value\r\n` lines, a blank line, and a body whose byte length is
//! given by the `Content-Length` header:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON message>
//! ```
//!
//! [`MessageFramer`] is an incremental decoder: feed it chunks as they
//! arrive from the wire and it yields every complete message, regardless of
//! where chunk boundaries fall. [`encode_message`] is the symmetric writer.
//!
//! Malformed input never desynchronizes the stream: a header block without
//! `Content-Length` is skipped, and a body that is not valid JSON is
//! reported as a [`FramerOutput::ParseError`] while decoding continues with
//! the next frame.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod framer;

pub use framer::{encode_message, FramerOutput, MessageFramer, WireError};
