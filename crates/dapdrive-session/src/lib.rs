//! The debug session state machine.
//!
//! A [`SessionManager`] owns one full debug session: it creates the client
//! for the configured adapter profile, walks the adapter-specific startup
//! ordering, installs breakpoints and exception filters, reacts to stops
//! (inspection, evaluation, stepping, tracing, assertion checking), and
//! emits the typed event stream through an [`EventSink`].
//!
//! # Lifecycle
//!
//! ```text
//! created → connecting → initializing → configuring → running
//!                                                   ↕
//!                                                stopped
//!                                                   ↓
//!                                              terminated
//! ```
//!
//! `session_start` is always the first event and `session_end` the last,
//! emitted exactly once; the run future never fails. Errors are stored in
//! the returned [`SessionResult`] for the run wrapper to re-raise.

#![deny(unsafe_code)]

mod config;
mod error;
mod events;
mod manager;
mod truthy;

pub use config::{SessionConfig, TraceConfig};
pub use error::SessionError;
pub use events::{
    CollectSink, Emitted, EventFilter, EventSink, ExceptionInfo, Location, SessionEvent,
    SessionSummary, StackFrameInfo, TraceConfigInfo,
};
pub use manager::{SessionManager, SessionResult};
pub use truthy::is_truthy;
