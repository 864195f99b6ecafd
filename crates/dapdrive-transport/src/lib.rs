//! Framed DAP transport with request/response correlation.
//!
//! A [`Transport`] owns one framed channel to a debug adapter, either the
//! stdio pair of a spawned child process or a TCP socket to a previously
//! started adapter server. It assigns outgoing sequence numbers, keeps a
//! pending-request map resolved by a reader task, enforces per-request
//! timeouts, and forwards everything that is not a response (adapter
//! events, reverse requests, stderr output, process exit) to the owner on
//! a single channel.
//!
//! # Shape
//!
//! The transport is actor-shaped: all mutable state lives behind one
//! shared inner structure, the reader task is the only writer of the
//! pending map resolution path, and callers interact through cheap clones
//! of the [`Transport`] handle.
//!
//! ```text
//! caller ──send_request──▶ writer half ─────▶ adapter
//! caller ◀──oneshot──── reader task ◀──────── adapter
//!                          │
//!                          └─▶ TransportEvent channel (events, reverse
//!                              requests, stderr, exit, close)
//! ```
//!
//! Responses resolve pending entries in arrival order, which is not
//! necessarily send order; sequence numbers are used for correlation only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod endpoint;
mod error;
mod transport;

pub use error::TransportError;
pub use transport::{Transport, TransportConfig, TransportEvent};
