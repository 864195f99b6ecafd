//! Session configuration, immutable once the session starts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use dapdrive_breakpoints::BreakpointSpec;
use dapdrive_client::AdapterProfile;
use dapdrive_variables::InspectorConfig;

use crate::error::SessionError;

/// Trace-mode policy: step repeatedly from a breakpoint and report
/// per-step deltas until a stop condition fires.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// `stepIn` instead of `next` at each trace step.
    pub step_into: bool,
    /// Hard cap on trace steps.
    pub limit: usize,
    /// Stop once this expression evaluates truthy.
    pub until: Option<String>,
    /// Snapshot locals every step and report variable changes.
    pub diff_vars: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self { step_into: false, limit: 500, until: None, diff_vars: false }
    }
}

/// Everything a session needs, fixed before startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The adapter to drive.
    pub profile: AdapterProfile,
    /// Program to launch. Mutually exclusive with `pid`.
    pub program: Option<PathBuf>,
    /// Process to attach to. Selects attach mode.
    pub pid: Option<u32>,
    /// Debuggee arguments (launch mode).
    pub program_args: Vec<String>,
    /// Debuggee working directory.
    pub cwd: Option<PathBuf>,
    /// Debuggee environment overlay.
    pub env: HashMap<String, String>,
    /// Breakpoints and logpoints, in user order.
    pub breakpoints: Vec<BreakpointSpec>,
    /// Exception filter tags to activate.
    pub exception_filters: Vec<String>,
    /// Expressions evaluated at each stop.
    pub evaluations: Vec<String>,
    /// Invariant expressions checked at each stop.
    pub assertions: Vec<String>,
    /// Global session timeout.
    pub timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Bounded wait for the adapter's `initialized` event.
    pub initialized_timeout: Duration,
    /// Fetch and expand locals at stops.
    pub capture_locals: bool,
    /// Fixed number of steps to execute after each breakpoint.
    pub steps: Option<u32>,
    /// Trace mode, entered at each breakpoint.
    pub trace: Option<TraceConfig>,
    /// Step once before evaluating, reporting the breakpoint with
    /// post-step evaluations.
    pub eval_after_step: bool,
    /// Variable expansion policy.
    pub inspector: InspectorConfig,
    /// Exception chain depth cap.
    pub exception_max_depth: usize,
    /// Stack frames fetched per stop.
    pub max_stack_frames: i64,
}

impl SessionConfig {
    /// A configuration with the documented defaults for one profile.
    pub fn new(profile: AdapterProfile) -> Self {
        Self {
            profile,
            program: None,
            pid: None,
            program_args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            breakpoints: Vec::new(),
            exception_filters: Vec::new(),
            evaluations: Vec::new(),
            assertions: Vec::new(),
            timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            initialized_timeout: Duration::from_secs(30),
            capture_locals: true,
            steps: None,
            trace: None,
            eval_after_step: false,
            inspector: InspectorConfig::default(),
            exception_max_depth: 5,
            max_stack_frames: 20,
        }
    }

    /// Attach mode is selected by a PID.
    pub fn is_attach(&self) -> bool {
        self.pid.is_some()
    }

    /// Checks the program/PID requirement.
    pub fn validate(&self) -> Result<(), SessionError> {
        match (&self.program, self.pid) {
            (None, None) => Err(SessionError::Configuration(
                "either a program path or a PID is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(SessionError::Configuration(
                "program path and PID are mutually exclusive".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Directory of the configured program, for breakpoint path anchoring.
    pub fn program_dir(&self) -> Option<PathBuf> {
        self.program.as_ref().and_then(|p| p.parent().map(PathBuf::from))
    }
}
