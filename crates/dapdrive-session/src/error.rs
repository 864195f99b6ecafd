//! Session-level error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Fatal outcomes stored on the session and re-raised by the run wrapper.
///
/// The session run future itself never fails; per-stop problems degrade to
/// `error` events and one of these is recorded only when the session as a
/// whole is over.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The global session timeout fired.
    #[error("session timed out after {0:?}")]
    Timeout(Duration),

    /// An assertion expression evaluated to a non-truthy value.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// The adapter connection failed or closed while the session ran.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The startup sequence (connect/initialize/launch/attach) failed.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The session configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Whether this error is an assertion violation, which gets its own
    /// exit status so orchestration can tell invariant failures apart.
    pub fn is_assertion(&self) -> bool {
        matches!(self, SessionError::AssertionFailed(_))
    }
}
