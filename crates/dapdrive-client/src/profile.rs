//! Declarative adapter profiles.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

/// How the adapter is reached.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportKind {
    /// Spawn the adapter and frame its stdin/stdout.
    ChildProcessStdio,
    /// Start the adapter as a TCP server (or find it running) and connect.
    ClientSocket {
        /// Host to connect to.
        host: String,
        /// Port the adapter listens on.
        port: u16,
        /// Delay between starting the server process and connecting.
        connect_delay: Duration,
    },
}

/// Inputs to a profile's launch-argument builder.
#[derive(Debug, Clone, Default)]
pub struct LaunchParams {
    /// Absolute path of the program to debug.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory for the debuggee.
    pub cwd: Option<String>,
    /// Environment overlay for the debuggee.
    pub env: HashMap<String, String>,
    /// Whether the adapter should stop at the entry point.
    pub stop_on_entry: bool,
}

/// Inputs to a profile's attach-argument builder.
#[derive(Debug, Clone)]
pub struct AttachParams {
    /// Process id of the running debuggee.
    pub pid: u32,
}

/// Declarative description of one debug backend.
///
/// Profiles are data, not subclasses: the session manager reads the
/// policy flags and picks one of the explicit startup ordering paths.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    /// Stable identifier, also sent as `adapterID` in `initialize`.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Executable that starts the adapter. `None` for socket adapters
    /// that are already running.
    pub command: Option<String>,
    /// Arguments for the adapter executable.
    pub args: Vec<String>,
    /// stdio-framed child process or client socket.
    pub transport: TransportKind,
    /// The adapter emits `initialized` only after `launch`/`attach`.
    pub requires_launch_first: bool,
    /// The adapter issues a reverse `handshake` that wants a signed
    /// challenge before it proceeds.
    pub signed_handshake: bool,
    /// Exception filter tags the backend understands.
    pub exception_filters: Vec<String>,
    /// Builds the adapter-specific `launch` arguments.
    pub launch_args: fn(&LaunchParams) -> Value,
    /// Builds the adapter-specific `attach` arguments.
    pub attach_args: fn(&AttachParams) -> Value,
}

impl AdapterProfile {
    /// Whether this profile connects over a client socket.
    pub fn is_socket(&self) -> bool {
        matches!(self.transport, TransportKind::ClientSocket { .. })
    }

    /// The socket endpoint, when the transport is a client socket.
    pub fn socket_endpoint(&self) -> Option<(&str, u16)> {
        match &self.transport {
            TransportKind::ClientSocket { host, port, .. } => Some((host.as_str(), *port)),
            TransportKind::ChildProcessStdio => None,
        }
    }
}
