//! The typed event catalog, the sink seam and the event filter.
//!
//! Field names here are the output contract: the sink serializes each
//! [`Emitted`] as one JSON object whose `type` is the snake_case event
//! name and whose remaining fields are camelCase.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dapdrive_exception::{ExceptionChainEntry, RootCause};
use dapdrive_protocol::ProtocolStackFrame;
use dapdrive_variables::{EvaluationResult, LocalsSnapshot, VariableChange};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A source position inside the debuggee.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Source file, absent for unresolved frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Column number (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Enclosing function.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// One reported stack frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameInfo {
    /// Adapter frame id, valid while stopped.
    pub id: i64,
    /// Function name.
    pub function: String,
    /// Source file, absent for native or unresolved frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    /// Column number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    /// Module or assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl StackFrameInfo {
    /// Converts an adapter frame.
    pub fn from_protocol(frame: &ProtocolStackFrame) -> Self {
        Self {
            id: frame.id,
            function: frame.name.clone(),
            file: frame.source.as_ref().and_then(|s| s.path.clone()),
            line: (frame.line > 0).then_some(frame.line),
            column: (frame.column > 0).then_some(frame.column),
            module: frame.module_id.as_ref().map(render_module),
        }
    }

    /// The location of this frame.
    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
            function: Some(self.function.clone()),
        }
    }
}

fn render_module(module_id: &Value) -> String {
    match module_id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The thrown exception as reported in `exception_thrown`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    /// Exception type.
    #[serde(rename = "type")]
    pub exception_type: String,
    /// Message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw stack trace text, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// The directly wrapped exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_exception: Option<Box<ExceptionInfo>>,
}

/// Trace configuration as echoed in `trace_started`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfigInfo {
    /// Whether trace steps use `stepIn`.
    pub step_into: bool,
    /// Step cap.
    pub limit: usize,
    /// Stop expression, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until_expression: Option<String>,
}

/// The `session_end` summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Wall-clock session duration.
    pub duration_ms: u64,
    /// Debuggee exit code; null when attached and left running.
    pub exit_code: Option<i64>,
    /// Breakpoint hits reported.
    pub breakpoints_hit: u64,
    /// Exceptions reported.
    pub exceptions_caught: u64,
    /// Steps executed across stepping and tracing.
    pub steps_executed: u64,
}

/// The typed event catalog. Variant names serialize as the snake_case
/// `type` discriminator; fields are camelCase.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// First event of every session.
    SessionStart {
        /// Adapter id.
        adapter: String,
        /// Program path (launch mode).
        #[serde(skip_serializing_if = "Option::is_none")]
        program: Option<String>,
        /// Target PID (attach mode).
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
        /// Program arguments.
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<Vec<String>>,
        /// Working directory.
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        /// Present and true in attach mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        attach: Option<bool>,
    },
    /// The debuggee was launched.
    ProcessLaunched {
        /// Debuggee PID when the adapter reports one.
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<i64>,
    },
    /// The debuggee was attached to.
    ProcessAttached {
        /// Target PID.
        pid: u32,
    },
    /// The debuggee exited.
    ProcessExited {
        /// Exit code.
        exit_code: i64,
        /// Time since session start.
        duration_ms: u64,
    },
    /// One breakpoint finished installation.
    BreakpointSet {
        /// Breakpoint id.
        id: i64,
        /// Source file.
        file: String,
        /// Bound line.
        line: i64,
        /// Whether the adapter verified it.
        verified: bool,
        /// Condition, when configured.
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        /// Adapter or failure message.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Exception filters were activated.
    ExceptionBreakpointSet {
        /// The active filter tags.
        filters: Vec<String>,
    },
    /// A breakpoint was hit.
    BreakpointHit {
        /// Breakpoint id, when the adapter reported it.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        /// Stopped thread.
        thread_id: i64,
        /// Stop location.
        location: Location,
        /// Bounded stack trace.
        stack_trace: Vec<StackFrameInfo>,
        /// Expanded locals.
        locals: LocalsSnapshot,
        /// Watch evaluation results.
        #[serde(skip_serializing_if = "Option::is_none")]
        evaluations: Option<IndexMap<String, EvaluationResult>>,
    },
    /// A logpoint fired.
    LogpointHit {
        /// Breakpoint id.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        /// Thread that passed the logpoint.
        thread_id: i64,
        /// Logpoint location.
        location: Location,
        /// The adapter-expanded message.
        log_output: String,
    },
    /// An exception stop.
    ExceptionThrown {
        /// Stopped thread.
        thread_id: i64,
        /// The thrown exception.
        exception: ExceptionInfo,
        /// Stop location.
        location: Location,
        /// Expanded locals.
        locals: LocalsSnapshot,
        /// Flattened inner-exception chain.
        #[serde(skip_serializing_if = "Option::is_none")]
        exception_chain: Option<Vec<ExceptionChainEntry>>,
        /// Root-cause classification.
        #[serde(skip_serializing_if = "Option::is_none")]
        root_cause: Option<RootCause>,
    },
    /// One fixed-count step finished.
    StepCompleted {
        /// Stepping thread.
        thread_id: i64,
        /// Position after the step.
        location: Location,
        /// Bounded stack trace.
        stack_trace: Vec<StackFrameInfo>,
        /// Expanded locals.
        locals: LocalsSnapshot,
    },
    /// Trace mode started at a breakpoint.
    TraceStarted {
        /// Traced thread.
        thread_id: i64,
        /// Where the trace began.
        start_location: Location,
        /// Stack depth at trace start.
        initial_stack_depth: usize,
        /// The active trace policy.
        trace_config: TraceConfigInfo,
    },
    /// One trace step.
    TraceStep {
        /// Traced thread.
        thread_id: i64,
        /// 1-based step number.
        step_number: usize,
        /// Position after the step.
        location: Location,
        /// Stack depth, in lightweight (non-diff) mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        stack_depth: Option<usize>,
        /// Variable changes since the previous step, omitted when empty.
        #[serde(skip_serializing_if = "Option::is_none")]
        changes: Option<Vec<VariableChange>>,
    },
    /// Trace mode ended.
    TraceCompleted {
        /// Traced thread.
        thread_id: i64,
        /// `limit_reached`, `function_return`, `expression_true`,
        /// `exception` or `breakpoint`.
        stop_reason: String,
        /// Steps executed during the trace.
        steps_executed: usize,
        /// Every visited location, starting point first.
        path: Vec<Location>,
        /// Where the trace ended.
        final_location: Location,
        /// Bounded stack trace at the end.
        stack_trace: Vec<StackFrameInfo>,
        /// Expanded locals at the end.
        locals: LocalsSnapshot,
        /// Watch evaluation results at the end.
        #[serde(skip_serializing_if = "Option::is_none")]
        evaluations: Option<IndexMap<String, EvaluationResult>>,
    },
    /// An assertion evaluated non-truthy; the session ends.
    AssertionFailed {
        /// Stopped thread.
        thread_id: i64,
        /// The failing expression.
        assertion: String,
        /// The rendered actual value, null when evaluation failed.
        actual_value: Option<String>,
        /// The evaluation error, when the expression could not be run.
        #[serde(skip_serializing_if = "Option::is_none")]
        evaluation_error: Option<String>,
        /// Stop location.
        location: Location,
        /// Bounded stack trace.
        stack_trace: Vec<StackFrameInfo>,
        /// Expanded locals.
        locals: LocalsSnapshot,
    },
    /// Debuggee output.
    ProgramOutput {
        /// `stdout`, `stderr` or `console`.
        category: String,
        /// The text.
        output: String,
    },
    /// A non-fatal session problem.
    Error {
        /// Problem description.
        message: String,
        /// Structured context.
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    /// Last event of every session.
    SessionEnd {
        /// Final statistics.
        summary: SessionSummary,
    },
}

impl SessionEvent {
    /// The snake_case discriminator, as serialized into `type`.
    pub fn type_name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStart { .. } => "session_start",
            SessionEvent::ProcessLaunched { .. } => "process_launched",
            SessionEvent::ProcessAttached { .. } => "process_attached",
            SessionEvent::ProcessExited { .. } => "process_exited",
            SessionEvent::BreakpointSet { .. } => "breakpoint_set",
            SessionEvent::ExceptionBreakpointSet { .. } => "exception_breakpoint_set",
            SessionEvent::BreakpointHit { .. } => "breakpoint_hit",
            SessionEvent::LogpointHit { .. } => "logpoint_hit",
            SessionEvent::ExceptionThrown { .. } => "exception_thrown",
            SessionEvent::StepCompleted { .. } => "step_completed",
            SessionEvent::TraceStarted { .. } => "trace_started",
            SessionEvent::TraceStep { .. } => "trace_step",
            SessionEvent::TraceCompleted { .. } => "trace_completed",
            SessionEvent::AssertionFailed { .. } => "assertion_failed",
            SessionEvent::ProgramOutput { .. } => "program_output",
            SessionEvent::Error { .. } => "error",
            SessionEvent::SessionEnd { .. } => "session_end",
        }
    }
}

/// One event as written to the sink: the typed payload plus an ISO-8601
/// UTC timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct Emitted {
    /// The event.
    #[serde(flatten)]
    pub event: SessionEvent,
    /// Emission time, RFC 3339 UTC.
    pub timestamp: String,
}

/// Where session events go. The session writes in emission order; each
/// event is independently serializable.
pub trait EventSink: Send {
    /// Consumes one event.
    fn emit(&mut self, event: &Emitted);
}

/// Include/exclude filtering by event type name.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl EventFilter {
    /// Builds a filter; `include = None` admits everything not excluded.
    pub fn new(include: Option<HashSet<String>>, exclude: HashSet<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether events of this type pass the filter.
    pub fn allows(&self, type_name: &str) -> bool {
        if self.exclude.contains(type_name) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(type_name),
            None => true,
        }
    }
}

/// Test-friendly sink that stores every event behind a shared handle.
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
    events: Arc<Mutex<Vec<Emitted>>>,
}

impl CollectSink {
    /// A new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that stays readable after the sink moves into a session.
    pub fn handle(&self) -> Arc<Mutex<Vec<Emitted>>> {
        Arc::clone(&self.events)
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: &Emitted) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let event = Emitted {
            event: SessionEvent::BreakpointSet {
                id: 1,
                file: "/app/Program.cs".to_string(),
                line: 42,
                verified: true,
                condition: None,
                message: None,
            },
            timestamp: "2024-05-01T12:00:00.000Z".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "breakpoint_set");
        assert_eq!(value["file"], "/app/Program.cs");
        assert_eq!(value["verified"], true);
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00.000Z");
        assert!(value.get("condition").is_none());
    }

    #[test]
    fn test_summary_field_names_are_camel_case() {
        let event = SessionEvent::SessionEnd {
            summary: SessionSummary {
                duration_ms: 1234,
                exit_code: Some(0),
                breakpoints_hit: 1,
                exceptions_caught: 0,
                steps_executed: 7,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session_end");
        assert_eq!(value["summary"]["durationMs"], 1234);
        assert_eq!(value["summary"]["breakpointsHit"], 1);
        assert_eq!(value["summary"]["stepsExecuted"], 7);
    }

    #[test]
    fn test_assertion_event_keeps_null_actual_value() {
        let event = SessionEvent::AssertionFailed {
            thread_id: 1,
            assertion: "order.Total >= 0".to_string(),
            actual_value: None,
            evaluation_error: Some("no such variable".to_string()),
            location: Location::default(),
            stack_trace: vec![],
            locals: LocalsSnapshot::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["actualValue"].is_null());
        assert_eq!(value["evaluationError"], "no such variable");
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let all = EventFilter::default();
        assert!(all.allows("breakpoint_hit"));

        let include = EventFilter::new(
            Some(HashSet::from(["breakpoint_hit".to_string(), "session_end".to_string()])),
            HashSet::new(),
        );
        assert!(include.allows("breakpoint_hit"));
        assert!(!include.allows("program_output"));

        let exclude =
            EventFilter::new(None, HashSet::from(["program_output".to_string()]));
        assert!(!exclude.allows("program_output"));
        assert!(exclude.allows("trace_step"));
    }

    #[test]
    fn test_stack_frame_conversion() {
        let frame = ProtocolStackFrame {
            id: 1000,
            name: "Program.Main".to_string(),
            source: Some(dapdrive_protocol::Source {
                path: Some("/app/Program.cs".to_string()),
                name: Some("Program.cs".to_string()),
                source_reference: None,
            }),
            line: 42,
            column: 9,
            module_id: None,
        };
        let info = StackFrameInfo::from_protocol(&frame);
        assert_eq!(info.function, "Program.Main");
        assert_eq!(info.location().line, Some(42));
        assert_eq!(info.location().file.as_deref(), Some("/app/Program.cs"));
    }
}
