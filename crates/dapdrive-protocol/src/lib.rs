//! Debug Adapter Protocol message and payload types.
//!
//! This crate defines the wire-level surface of the Debug Adapter Protocol
//! as used by the dapdrive client: the three-message envelope
//! ([`ProtocolMessage`]) and the argument/body structures for every command
//! the driver issues or answers.
//!
//! # Message Transport
//!
//! Messages are framed using Content-Length headers:
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <JSON message>
//! ```
//!
//! Framing itself lives in `dapdrive-wire`; this crate is purely the typed
//! JSON layer.
//!
//! # References
//!
//! - [Debug Adapter Protocol Specification](https://microsoft.github.io/debug-adapter-protocol/)

mod message;
mod types;

pub use message::ProtocolMessage;
pub use types::*;
