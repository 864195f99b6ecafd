//! Typed argument, body and event payloads.
//!
//! Only the subset of the protocol the driver actually exercises is typed;
//! launch and attach arguments stay adapter-specific [`serde_json::Value`]
//! objects produced by the adapter profile builders.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Initialize
// ============================================================================

/// Arguments for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequestArguments {
    /// Client ID reported to the adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// The adapter's stable identifier.
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    /// Locale (e.g. "en-US").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Lines are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    /// Columns are 1-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    /// Path format ("path" or "uri").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
    /// The client supports the `type` attribute on variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_type: Option<bool>,
    /// The client supports variable paging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_paging: Option<bool>,
    /// The client supports reverse requests for running processes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_run_in_terminal_request: Option<bool>,
    /// The client supports the `startDebugging` reverse request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_start_debugging_request: Option<bool>,
}

/// Adapter capabilities returned from `initialize`.
///
/// Unknown capability fields are preserved in `extra` so the store keeps
/// whatever a newer adapter advertises.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Supports the `configurationDone` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_configuration_done_request: Option<bool>,
    /// Supports conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_conditional_breakpoints: Option<bool>,
    /// Supports hit-conditional breakpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_hit_conditional_breakpoints: Option<bool>,
    /// Supports logpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_log_points: Option<bool>,
    /// Supports the `terminate` request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_terminate_request: Option<bool>,
    /// Supports the `terminateDebuggee` option on `disconnect`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_terminate_debuggee: Option<bool>,
    /// Supports delayed loading of stack frame ranges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_delayed_stack_trace_loading: Option<bool>,
    /// Exception breakpoint filters the adapter understands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_breakpoint_filters: Option<Vec<ExceptionBreakpointFilter>>,
    /// Any capability fields this client does not model.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Exception breakpoint filter descriptor advertised in capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionBreakpointFilter {
    /// Unique filter identifier.
    pub filter: String,
    /// Human-readable label.
    pub label: String,
    /// Whether this filter is enabled by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

// ============================================================================
// Breakpoints
// ============================================================================

/// Source reference in breakpoint requests and stack frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Absolute file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// File name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Opaque reference for sources without a path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

/// One requested breakpoint within a `setBreakpoints` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// Line number (1-based).
    pub line: i64,
    /// Column number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Breakpoint condition expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Hit-condition expression (e.g. `3` or `>= 10`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    /// Logpoint message template. When present the adapter logs and continues.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

/// Arguments for the `setBreakpoints` request.
///
/// The breakpoint list replaces all previously installed breakpoints for
/// the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    /// Source the breakpoints belong to.
    pub source: Source,
    /// The full breakpoint list for the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    /// Whether the underlying source was modified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<bool>,
}

/// A breakpoint as reported back by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Adapter-assigned identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Whether the breakpoint could be verified.
    pub verified: bool,
    /// Adapter-adjusted line, when it differs from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Adapter message (why the breakpoint is unverified, or a note).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response body for `setBreakpoints`; entries match the request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    /// Installed breakpoints, in request order.
    pub breakpoints: Vec<Breakpoint>,
}

/// Arguments for the `setExceptionBreakpoints` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    /// Exception filter tags to activate.
    pub filters: Vec<String>,
}

// ============================================================================
// Stack, scopes, variables, evaluate
// ============================================================================

/// Arguments for the `stackTrace` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    /// Thread to fetch the stack for.
    pub thread_id: i64,
    /// Index of the first frame to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// Maximum number of frames to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

/// A stack frame as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStackFrame {
    /// Frame identifier, valid while the thread is stopped.
    pub id: i64,
    /// Frame name, typically the function.
    pub name: String,
    /// Source location, absent for frames without resolvable source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Line number (1-based, 0 when unknown).
    pub line: i64,
    /// Column number (1-based, 0 when unknown).
    pub column: i64,
    /// Module or assembly the frame belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<Value>,
}

/// Response body for `stackTrace`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    /// Frames, topmost first.
    pub stack_frames: Vec<ProtocolStackFrame>,
    /// Total frames available, when the adapter paginates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<i64>,
}

/// Arguments for the `scopes` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    /// Frame to fetch scopes for.
    pub frame_id: i64,
}

/// A variable scope within a stack frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Scope name (e.g. "Locals", "Arguments").
    pub name: String,
    /// Presentation hint ("locals", "arguments", "registers").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
    /// Reference handle for the scope's variables.
    pub variables_reference: i64,
    /// Whether fetching the scope is expensive.
    #[serde(default)]
    pub expensive: bool,
}

/// Response body for `scopes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesResponseBody {
    /// Scopes of the frame.
    pub scopes: Vec<Scope>,
}

/// Arguments for the `variables` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    /// Reference handle of the container to expand.
    pub variables_reference: i64,
    /// Optional filter ("indexed" or "named").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Start index for paging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Maximum number of variables to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

/// A variable as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVariable {
    /// Variable name.
    pub name: String,
    /// Adapter-rendered value text.
    pub value: String,
    /// Type of the variable.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Reference handle for children (0 means none).
    #[serde(default)]
    pub variables_reference: i64,
    /// Number of named children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<i64>,
    /// Number of indexed children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<i64>,
}

/// Response body for `variables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesResponseBody {
    /// Children of the requested container.
    pub variables: Vec<ProtocolVariable>,
}

/// Arguments for the `evaluate` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    /// Expression to evaluate.
    pub expression: String,
    /// Frame providing the evaluation context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    /// Evaluation context ("watch", "repl", "hover").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Response body for `evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponseBody {
    /// Rendered result text.
    pub result: String,
    /// Type of the result.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Reference handle for a structured result (0 means none).
    #[serde(default)]
    pub variables_reference: i64,
}

// ============================================================================
// Threads and control flow
// ============================================================================

/// A thread in the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Thread identifier.
    pub id: i64,
    /// Human-readable thread name.
    pub name: String,
}

/// Response body for `threads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsResponseBody {
    /// All known threads.
    pub threads: Vec<Thread>,
}

/// Arguments for `continue`, `next`, `stepIn`, `stepOut` and `pause`.
///
/// All five control-flow requests carry the same single field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadControlArguments {
    /// Thread to act on.
    pub thread_id: i64,
}

/// Response body for `continue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    /// Whether all threads were resumed.
    #[serde(default)]
    pub all_threads_continued: bool,
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Arguments for the `disconnect` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    /// Whether the adapter should restart the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    /// Whether the debuggee should be terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
}

// ============================================================================
// Adapter events
// ============================================================================

/// Body of the `stopped` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedEventBody {
    /// Stop reason: `breakpoint`, `exception`, `step`, `pause`, `entry`, ...
    pub reason: String,
    /// Adapter-provided description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Thread that stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    /// Additional text, e.g. the exception rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether all threads stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_threads_stopped: Option<bool>,
    /// Ids of the breakpoints that triggered the stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_breakpoint_ids: Option<Vec<i64>>,
}

/// Body of the `output` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputEventBody {
    /// Output category: `stdout`, `stderr`, `console`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The text.
    pub output: String,
}

/// Body of the `exited` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitedEventBody {
    /// Debuggee exit code.
    pub exit_code: i64,
}

/// Body of the `breakpoint` event (adapter-side breakpoint state change).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    /// The kind of change: `changed`, `new` or `removed`.
    pub reason: String,
    /// The breakpoint in its new state.
    pub breakpoint: Breakpoint,
}

// ============================================================================
// Reverse requests
// ============================================================================

/// Arguments of the adapter's reverse `startDebugging` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDebuggingRequestArguments {
    /// Launch or attach configuration for the child session. Contains the
    /// adapter-assigned target id the child `launch` must echo back.
    pub configuration: Value,
    /// `launch` or `attach`.
    pub request: String,
}

/// Arguments of the adapter's reverse `handshake` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequestArguments {
    /// The challenge string to sign.
    pub value: String,
}

/// Response body for the reverse `handshake` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponseBody {
    /// The computed signature, empty when no signer is available.
    pub signature: String,
}
