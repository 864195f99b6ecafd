//! Transport-level error taxonomy.

use thiserror::Error;

/// Errors surfaced by transport operations.
///
/// Request futures reject with exactly one of these; a closed transport
/// rejects every pending request with [`TransportError::Closed`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying channel is closed (peer EOF, I/O failure or
    /// explicit [`close`](crate::Transport::close)).
    #[error("transport closed")]
    Closed,

    /// No response arrived within the request timeout. The pending entry
    /// is cancelled; a late response is discarded.
    #[error("timed out waiting for response to {command} (seq {seq})")]
    TimedOut {
        /// Command of the timed-out request.
        command: String,
        /// Sequence number of the timed-out request.
        seq: i64,
    },

    /// The adapter answered with `success = false`. The adapter's own
    /// message is carried verbatim.
    #[error("{command} failed: {message}")]
    RequestFailed {
        /// Command that failed.
        command: String,
        /// Adapter-provided failure message.
        message: String,
    },

    /// I/O failure on the underlying channel or while spawning the
    /// adapter process.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be serialized for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// True when the error means the channel itself is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::Io(_))
    }
}
