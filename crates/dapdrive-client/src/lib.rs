//! The typed DAP client.
//!
//! A [`DapClient`] drives one debug adapter described by an
//! [`AdapterProfile`]: it spawns the adapter (or starts it as a server and
//! connects), performs the `initialize` handshake, exposes typed request
//! methods, and relays adapter events upward as [`ClientEvent`]s.
//!
//! Two adapter peculiarities are absorbed here so the session layer never
//! sees them:
//!
//! - **Signed handshake**: adapters that issue a reverse `handshake`
//!   request get their challenge signed by a platform-local signer when
//!   one is installed, and an empty signature otherwise.
//! - **Multi-session fan-out**: supervisor adapters issue a reverse
//!   `startDebugging` request; the client opens a second transport to the
//!   same endpoint, replays initialization, breakpoints and exception
//!   filters, launches the child configuration, and from then on routes
//!   debugging operations to the child transport while administrative
//!   operations stay on the parent.

#![deny(unsafe_code)]

mod client;
mod fanout;
mod handshake;
mod profile;

pub use client::{ClientError, ClientEvent, ClientOptions, DapClient};
pub use profile::{AdapterProfile, AttachParams, LaunchParams, TransportKind};
