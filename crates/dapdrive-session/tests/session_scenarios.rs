//! End-to-end session scenarios against a scripted adapter.
//!
//! The mock speaks framed DAP over a real TCP socket, so these tests
//! exercise the full stack: wire framing, transport correlation, the
//! client, inspection and the session state machine.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dapdrive_client::{AdapterProfile, AttachParams, LaunchParams, TransportKind};
use dapdrive_protocol::ProtocolMessage;
use dapdrive_session::{
    CollectSink, Emitted, EventFilter, SessionConfig, SessionManager, TraceConfig,
};
use dapdrive_wire::{encode_message, FramerOutput, MessageFramer};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ----------------------------------------------------------------------
// Scripted adapter
// ----------------------------------------------------------------------

struct AdapterConn {
    socket: TcpStream,
    framer: MessageFramer,
    next_seq: i64,
}

impl AdapterConn {
    fn new(socket: TcpStream) -> Self {
        Self { socket, framer: MessageFramer::new(), next_seq: 1 }
    }

    /// Returns the next request, or `None` when the driver hung up.
    async fn recv_request(&mut self) -> Option<(i64, String, Option<Value>)> {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = self.socket.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            for output in self.framer.push(&buf[..n]).unwrap() {
                if let FramerOutput::Message(ProtocolMessage::Request { seq, command, arguments }) =
                    output
                {
                    return Some((seq, command, arguments));
                }
            }
        }
    }

    async fn send(&mut self, message: &ProtocolMessage) {
        let frame = encode_message(message).unwrap();
        self.socket.write_all(&frame).await.unwrap();
        self.socket.flush().await.unwrap();
    }

    async fn respond(&mut self, request_seq: i64, command: &str, body: Option<Value>) {
        let seq = self.bump_seq();
        self.send(&ProtocolMessage::Response {
            seq,
            request_seq,
            success: true,
            command: command.to_string(),
            message: None,
            body,
        })
        .await;
    }

    async fn reject(&mut self, request_seq: i64, command: &str, message: &str) {
        let seq = self.bump_seq();
        self.send(&ProtocolMessage::Response {
            seq,
            request_seq,
            success: false,
            command: command.to_string(),
            message: Some(message.to_string()),
            body: None,
        })
        .await;
    }

    async fn send_event(&mut self, event: &str, body: Option<Value>) {
        let seq = self.bump_seq();
        self.send(&ProtocolMessage::Event { seq, event: event.to_string(), body }).await;
    }

    fn bump_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// Declarative debuggee script: what the adapter reports at each point.
#[derive(Default)]
struct MockDebuggee {
    /// stackTrace bodies, popped per request; the last one repeats.
    frame_bodies: Vec<Value>,
    frame_cursor: usize,
    /// variables bodies by reference handle.
    variables: HashMap<i64, Value>,
    /// evaluate results per expression; the last entry repeats.
    evaluations: HashMap<String, VecDeque<Value>>,
    /// Emitted after the launch/attach response.
    initial_stop: Option<Value>,
    /// Output events pushed right before the initial stop.
    initial_output: Vec<(String, String)>,
    /// Emitted after each next/stepIn response.
    step_stops: VecDeque<Value>,
    /// Emitted after each continue response; exhausted → program ends.
    continue_stops: VecDeque<Value>,
    /// Exit code reported when the program ends.
    exit_code: i64,
    /// Whether an `exited` event precedes `terminated` (launch mode).
    emit_exited: bool,
    /// Respond to launch/attach and then go silent (for timeout tests).
    hang_after_launch: bool,
    /// Received commands, for ordering assertions.
    commands: Arc<Mutex<Vec<String>>>,
    /// Received setBreakpoints argument payloads.
    breakpoint_requests: Arc<Mutex<Vec<Value>>>,
    /// Received disconnect argument payloads.
    disconnect_requests: Arc<Mutex<Vec<Value>>>,
}

impl MockDebuggee {
    fn stack(&mut self) -> Value {
        let body = self
            .frame_bodies
            .get(self.frame_cursor)
            .or_else(|| self.frame_bodies.last())
            .cloned()
            .unwrap_or_else(|| json!({"stackFrames": []}));
        if self.frame_cursor + 1 < self.frame_bodies.len() {
            self.frame_cursor += 1;
        }
        body
    }

    fn evaluate(&mut self, expression: &str) -> Option<Value> {
        let queue = self.evaluations.get_mut(expression)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    async fn end_program(&mut self, conn: &mut AdapterConn) {
        if self.emit_exited {
            conn.send_event("exited", Some(json!({"exitCode": self.exit_code}))).await;
        }
        conn.send_event("terminated", None).await;
    }
}

async fn run_adapter(mut conn: AdapterConn, mut mock: MockDebuggee) {
    while let Some((seq, command, arguments)) = conn.recv_request().await {
        mock.commands.lock().unwrap().push(command.clone());
        match command.as_str() {
            "initialize" => {
                conn.respond(
                    seq,
                    &command,
                    Some(json!({
                        "supportsConfigurationDoneRequest": true,
                        "supportsConditionalBreakpoints": true,
                        "supportsHitConditionalBreakpoints": true,
                        "supportsLogPoints": true,
                        "exceptionBreakpointFilters": [
                            {"filter": "all", "label": "All Exceptions"},
                            {"filter": "uncaught", "label": "Uncaught Exceptions"}
                        ]
                    })),
                )
                .await;
                conn.send_event("initialized", None).await;
            }
            "setBreakpoints" => {
                let arguments = arguments.unwrap_or_default();
                mock.breakpoint_requests.lock().unwrap().push(arguments.clone());
                let count = arguments["breakpoints"].as_array().map(Vec::len).unwrap_or(0);
                let breakpoints: Vec<Value> = (0..count)
                    .map(|index| {
                        json!({
                            "id": index as i64 + 1,
                            "verified": true,
                            "line": arguments["breakpoints"][index]["line"]
                        })
                    })
                    .collect();
                conn.respond(seq, &command, Some(json!({"breakpoints": breakpoints}))).await;
            }
            "setExceptionBreakpoints" | "configurationDone" => {
                conn.respond(seq, &command, None).await;
            }
            "launch" | "attach" => {
                conn.respond(seq, &command, None).await;
                if mock.hang_after_launch {
                    continue;
                }
                for (category, output) in std::mem::take(&mut mock.initial_output) {
                    conn.send_event("output", Some(json!({"category": category, "output": output})))
                        .await;
                }
                match mock.initial_stop.take() {
                    Some(stop) => conn.send_event("stopped", Some(stop)).await,
                    None => mock.end_program(&mut conn).await,
                }
            }
            "threads" => {
                conn.respond(seq, &command, Some(json!({"threads": [{"id": 1, "name": "main"}]})))
                    .await;
            }
            "stackTrace" => {
                let body = mock.stack();
                conn.respond(seq, &command, Some(body)).await;
            }
            "scopes" => {
                conn.respond(
                    seq,
                    &command,
                    Some(json!({
                        "scopes": [
                            {"name": "Locals", "variablesReference": 2000, "expensive": false}
                        ]
                    })),
                )
                .await;
            }
            "variables" => {
                let reference = arguments
                    .as_ref()
                    .and_then(|a| a["variablesReference"].as_i64())
                    .unwrap_or(0);
                let body = mock
                    .variables
                    .get(&reference)
                    .cloned()
                    .unwrap_or_else(|| json!({"variables": []}));
                conn.respond(seq, &command, Some(body)).await;
            }
            "evaluate" => {
                let expression = arguments
                    .as_ref()
                    .and_then(|a| a["expression"].as_str())
                    .unwrap_or_default()
                    .to_string();
                match mock.evaluate(&expression) {
                    Some(body) => conn.respond(seq, &command, Some(body)).await,
                    None => conn.reject(seq, &command, "unable to evaluate").await,
                }
            }
            "next" | "stepIn" | "stepOut" => {
                conn.respond(seq, &command, None).await;
                match mock.step_stops.pop_front() {
                    Some(stop) => conn.send_event("stopped", Some(stop)).await,
                    None => mock.end_program(&mut conn).await,
                }
            }
            "continue" => {
                conn.respond(seq, &command, Some(json!({"allThreadsContinued": true}))).await;
                match mock.continue_stops.pop_front() {
                    Some(stop) => conn.send_event("stopped", Some(stop)).await,
                    None => mock.end_program(&mut conn).await,
                }
            }
            "disconnect" => {
                mock.disconnect_requests.lock().unwrap().push(arguments.unwrap_or_default());
                conn.respond(seq, &command, None).await;
                return;
            }
            other => {
                conn.reject(seq, other, "unsupported in mock").await;
            }
        }
    }
}

// ----------------------------------------------------------------------
// Test plumbing
// ----------------------------------------------------------------------

fn launch_args(params: &LaunchParams) -> Value {
    json!({"program": params.program, "args": params.args, "cwd": params.cwd})
}

fn attach_args(params: &AttachParams) -> Value {
    json!({"processId": params.pid})
}

fn profile(port: u16) -> AdapterProfile {
    AdapterProfile {
        id: "mockclr".to_string(),
        name: "Mock Debugger".to_string(),
        command: None,
        args: vec![],
        transport: TransportKind::ClientSocket {
            host: "127.0.0.1".to_string(),
            port,
            connect_delay: Duration::from_millis(0),
        },
        requires_launch_first: false,
        signed_handshake: false,
        exception_filters: vec!["all".to_string(), "uncaught".to_string()],
        launch_args,
        attach_args,
    }
}

fn base_config(port: u16) -> SessionConfig {
    let mut config = SessionConfig::new(profile(port));
    config.program = Some("/app/Program.cs".into());
    config.timeout = Duration::from_secs(10);
    config.request_timeout = Duration::from_secs(5);
    config.initialized_timeout = Duration::from_millis(500);
    config
}

fn stopped(reason: &str, hit_ids: Option<Vec<i64>>) -> Value {
    let mut body = json!({"reason": reason, "threadId": 1, "allThreadsStopped": true});
    if let Some(ids) = hit_ids {
        body["hitBreakpointIds"] = json!(ids);
    }
    body
}

fn frames(line: i64) -> Value {
    json!({
        "stackFrames": [
            {"id": 1000, "name": "Program.Main", "line": line, "column": 9,
             "source": {"path": "/app/Program.cs", "name": "Program.cs"}}
        ],
        "totalFrames": 1
    })
}

fn eval_result(result: &str, type_name: &str) -> Value {
    json!({"result": result, "type": type_name, "variablesReference": 0})
}

async fn start_mock(mock: MockDebuggee) -> (u16, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        run_adapter(AdapterConn::new(socket), mock).await;
    });
    (port, handle)
}

fn event_types(events: &[Emitted]) -> Vec<String> {
    events.iter().map(|e| e.event.type_name().to_string()).collect()
}

fn event_json(events: &[Emitted], type_name: &str) -> Value {
    let event = events
        .iter()
        .find(|e| e.event.type_name() == type_name)
        .unwrap_or_else(|| panic!("no '{type_name}' event in {:?}", event_types(events)));
    serde_json::to_value(event).unwrap()
}

// ----------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------

/// Single breakpoint, single hit, one evaluation, clean exit.
#[tokio::test]
async fn test_single_breakpoint_single_hit() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42)],
        variables: HashMap::from([
            (
                2000,
                json!({"variables": [
                    {"name": "order", "value": "Order {...}", "type": "Order", "variablesReference": 2001}
                ]}),
            ),
            (
                2001,
                json!({"variables": [
                    {"name": "Total", "value": "125.50", "type": "decimal", "variablesReference": 0},
                    {"name": "Id", "value": "7", "type": "int", "variablesReference": 0}
                ]}),
            ),
        ]),
        evaluations: HashMap::from([(
            "order.Total".to_string(),
            VecDeque::from([eval_result("125.50", "decimal")]),
        )]),
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let commands = Arc::clone(&mock.commands);
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap()];
    config.evaluations = vec!["order.Total".to_string()];

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;

    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    let events = handle.lock().unwrap().clone();
    assert_eq!(
        event_types(&events),
        vec![
            "session_start",
            "breakpoint_set",
            "process_launched",
            "breakpoint_hit",
            "process_exited",
            "session_end"
        ]
    );

    let hit = event_json(&events, "breakpoint_hit");
    assert_eq!(hit["id"], 1);
    assert_eq!(hit["location"]["line"], 42);
    assert_eq!(hit["evaluations"]["order.Total"]["result"], "125.50");
    assert_eq!(hit["locals"]["order"]["value"]["Total"]["value"], 125.50);

    let set = event_json(&events, "breakpoint_set");
    assert_eq!(set["id"], 1);
    assert_eq!(set["verified"], true);

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["breakpointsHit"], 1);
    assert_eq!(end["summary"]["exitCode"], 0);

    // Socket family ordering: configurationDone strictly before launch.
    let commands = commands.lock().unwrap().clone();
    let config_done = commands.iter().position(|c| c == "configurationDone").unwrap();
    let launch = commands.iter().position(|c| c == "launch").unwrap();
    assert!(config_done < launch, "configurationDone must precede launch: {commands:?}");

    adapter.await.unwrap();
}

/// A `#3` suffix becomes a hit condition; the adapter stops once.
#[tokio::test]
async fn test_hit_count_breakpoint_installs_hit_condition() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(10)],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let breakpoint_requests = Arc::clone(&mock.breakpoint_requests);
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.program = Some("/app/loop.py".into());
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/loop.py:10#3").unwrap()];
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let requests = breakpoint_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["breakpoints"][0]["hitCondition"], "3");

    let events = handle.lock().unwrap().clone();
    let hits = events.iter().filter(|e| e.event.type_name() == "breakpoint_hit").count();
    assert_eq!(hits, 1);
    adapter.await.unwrap();
}

/// Trace until an expression turns truthy.
#[tokio::test]
async fn test_trace_until_expression() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(30)],
        evaluations: HashMap::from([(
            "total > 100".to_string(),
            VecDeque::from([
                eval_result("false", "bool"),
                eval_result("false", "bool"),
                eval_result("true", "bool"),
            ]),
        )]),
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        step_stops: VecDeque::from([
            stopped("step", None),
            stopped("step", None),
            stopped("step", None),
        ]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.program = Some("/app/calc.ts".into());
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/calc.ts:30").unwrap()];
    config.trace = Some(TraceConfig {
        step_into: false,
        limit: 500,
        until: Some("total > 100".to_string()),
        diff_vars: false,
    });
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);

    let events = handle.lock().unwrap().clone();
    let types = event_types(&events);
    assert_eq!(
        types,
        vec![
            "session_start",
            "breakpoint_set",
            "process_launched",
            "breakpoint_hit",
            "trace_started",
            "trace_step",
            "trace_step",
            "trace_step",
            "trace_completed",
            "process_exited",
            "session_end"
        ]
    );

    let completed = event_json(&events, "trace_completed");
    assert_eq!(completed["stopReason"], "expression_true");
    assert_eq!(completed["stepsExecuted"], 3);
    assert_eq!(completed["path"].as_array().unwrap().len(), 4);

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["stepsExecuted"], 3);
    adapter.await.unwrap();
}

/// Trace step limit fires when nothing else stops the trace.
#[tokio::test]
async fn test_trace_limit_reached() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(5)],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        step_stops: VecDeque::from(vec![stopped("step", None); 10]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:5").unwrap()];
    config.trace = Some(TraceConfig { step_into: true, limit: 3, until: None, diff_vars: false });
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let events = handle.lock().unwrap().clone();
    let completed = event_json(&events, "trace_completed");
    assert_eq!(completed["stopReason"], "limit_reached");
    assert_eq!(completed["stepsExecuted"], 3);
    adapter.await.unwrap();
}

/// Exception with an inner chain: flattening, root cause, hint.
#[tokio::test]
async fn test_exception_with_inner_chain() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(77)],
        variables: HashMap::from([
            (
                2000,
                json!({"variables": [
                    {"name": "$exception", "value": "DbConnectionException {DbConnectionException}",
                     "type": "DbConnectionException", "variablesReference": 3000}
                ]}),
            ),
            (
                3000,
                json!({"variables": [
                    {"name": "Message", "value": "\"Could not open connection\"", "type": "string", "variablesReference": 0},
                    {"name": "InnerException", "value": "SocketException {System.Net.Sockets.SocketException}",
                     "type": "System.Exception", "variablesReference": 3001}
                ]}),
            ),
            (
                3001,
                json!({"variables": [
                    {"name": "Message", "value": "\"Connection refused\"", "type": "string", "variablesReference": 0},
                    {"name": "NativeErrorCode", "value": "10061", "type": "int", "variablesReference": 0},
                    {"name": "InnerException", "value": "null", "type": "System.Exception", "variablesReference": 0}
                ]}),
            ),
        ]),
        initial_stop: Some(json!({
            "reason": "exception", "threadId": 1,
            "description": "DbConnectionException",
            "text": "Could not open connection"
        })),
        exit_code: 1,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.exception_filters = vec!["all".to_string()];

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let events = handle.lock().unwrap().clone();
    assert!(event_types(&events).contains(&"exception_breakpoint_set".to_string()));

    let thrown = event_json(&events, "exception_thrown");
    let chain = thrown["exceptionChain"].as_array().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0]["isRootCause"], false);
    assert_eq!(chain[1]["isRootCause"], true);
    assert_eq!(chain[1]["type"], "System.Net.Sockets.SocketException");
    assert_eq!(thrown["rootCause"]["category"], "network");
    assert!(thrown["rootCause"]["actionableHint"]
        .as_str()
        .unwrap()
        .contains("Connection refused"));
    assert_eq!(thrown["exception"]["innerException"]["type"], "System.Net.Sockets.SocketException");

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["exceptionsCaught"], 1);
    adapter.await.unwrap();
}

/// Attach mode: the debuggee stays alive and untouched.
#[tokio::test]
async fn test_attach_leaves_debuggee_running() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(12)],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        emit_exited: false,
        ..MockDebuggee::default()
    };
    let disconnects = Arc::clone(&mock.disconnect_requests);
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.program = None;
    config.pid = Some(12345);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:12").unwrap()];
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);

    let events = handle.lock().unwrap().clone();
    let types = event_types(&events);
    assert!(types.contains(&"process_attached".to_string()));
    assert!(!types.contains(&"process_exited".to_string()));

    let start = event_json(&events, "session_start");
    assert_eq!(start["attach"], true);
    assert_eq!(start["pid"], 12345);

    let attached = event_json(&events, "process_attached");
    assert_eq!(attached["pid"], 12345);

    let end = event_json(&events, "session_end");
    assert!(end["summary"]["exitCode"].is_null());

    // The disconnect must not terminate the attached debuggee.
    let disconnects = disconnects.lock().unwrap().clone();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0]["terminateDebuggee"], false);
    adapter.await.unwrap();
}

/// A failing assertion ends the session immediately.
#[tokio::test]
async fn test_assertion_violation_stops_session() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42)],
        evaluations: HashMap::from([
            ("order.Total >= 0".to_string(), VecDeque::from([eval_result("false", "bool")])),
            ("order.Total".to_string(), VecDeque::from([eval_result("-5", "decimal")])),
        ]),
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        // Two more stops scripted: they must never be reached.
        continue_stops: VecDeque::from([stopped("breakpoint", Some(vec![1]))]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap()];
    config.assertions = vec!["order.Total >= 0".to_string()];
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;

    assert!(result.error.as_ref().is_some_and(|e| e.is_assertion()));

    let events = handle.lock().unwrap().clone();
    let failed = event_json(&events, "assertion_failed");
    assert_eq!(failed["assertion"], "order.Total >= 0");
    assert_eq!(failed["actualValue"], "-5");
    assert_eq!(failed["location"]["line"], 42);

    let failures =
        events.iter().filter(|e| e.event.type_name() == "assertion_failed").count();
    assert_eq!(failures, 1);

    // session_end is last, and only one breakpoint was examined.
    let types = event_types(&events);
    assert_eq!(types.last().map(String::as_str), Some("session_end"));
    assert_eq!(types.iter().filter(|t| *t == "breakpoint_hit").count(), 1);
    adapter.await.unwrap();
}

/// Fixed-count stepping after a breakpoint.
#[tokio::test]
async fn test_fixed_count_stepping() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42), frames(43), frames(44)],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        step_stops: VecDeque::from([stopped("step", None), stopped("step", None)]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap()];
    config.steps = Some(2);
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let events = handle.lock().unwrap().clone();
    let steps: Vec<&Emitted> =
        events.iter().filter(|e| e.event.type_name() == "step_completed").collect();
    assert_eq!(steps.len(), 2);

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["stepsExecuted"], 2);
    adapter.await.unwrap();
}

/// Eval-after-step: the hit reports the original location with post-step
/// evaluations.
#[tokio::test]
async fn test_eval_after_step_defers_evaluation() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42), frames(43)],
        evaluations: HashMap::from([(
            "order.Total".to_string(),
            VecDeque::from([eval_result("126.00", "decimal")]),
        )]),
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        step_stops: VecDeque::from([stopped("step", None)]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap()];
    config.evaluations = vec!["order.Total".to_string()];
    config.eval_after_step = true;
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let events = handle.lock().unwrap().clone();
    let hit = event_json(&events, "breakpoint_hit");
    // Original breakpoint location, post-step evaluation.
    assert_eq!(hit["location"]["line"], 42);
    assert_eq!(hit["evaluations"]["order.Total"]["result"], "126.00");
    adapter.await.unwrap();
}

/// The deferred step lands on another breakpoint: the pending hit is
/// flushed with evaluations from the new frame, then the second
/// breakpoint gets its own deferred hit. Exactly one `breakpoint_hit`
/// per breakpoint stop, never fewer.
#[tokio::test]
async fn test_second_breakpoint_preempts_deferred_hit() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42), frames(50), frames(51)],
        evaluations: HashMap::from([(
            "order.Total".to_string(),
            VecDeque::from([eval_result("125.50", "decimal"), eval_result("126.00", "decimal")]),
        )]),
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        // The step after breakpoint 1 lands directly on breakpoint 2;
        // only the step after breakpoint 2 is a plain step stop.
        step_stops: VecDeque::from([
            stopped("breakpoint", Some(vec![2])),
            stopped("step", None),
        ]),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints = vec![
        dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap(),
        dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:50").unwrap(),
    ];
    config.evaluations = vec!["order.Total".to_string()];
    config.eval_after_step = true;
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);

    let events = handle.lock().unwrap().clone();
    let hits: Vec<Value> = events
        .iter()
        .filter(|e| e.event.type_name() == "breakpoint_hit")
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();
    assert_eq!(hits.len(), 2, "one breakpoint_hit per breakpoint stop: {:?}", event_types(&events));

    // The flushed hit keeps breakpoint 1's original location.
    assert_eq!(hits[0]["id"], 1);
    assert_eq!(hits[0]["location"]["line"], 42);
    assert_eq!(hits[0]["evaluations"]["order.Total"]["result"], "125.50");

    // The second breakpoint completes its own deferral normally.
    assert_eq!(hits[1]["id"], 2);
    assert_eq!(hits[1]["location"]["line"], 50);
    assert_eq!(hits[1]["evaluations"]["order.Total"]["result"], "126.00");

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["breakpointsHit"], 2);
    adapter.await.unwrap();
}

/// A logpoint stop reports the adapter-expanded message and resumes.
#[tokio::test]
async fn test_logpoint_reports_output_and_continues() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(7)],
        initial_output: vec![("console".to_string(), "order is 42\n".to_string())],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.program = Some("/app/app.js".into());
    config.breakpoints = vec![dapdrive_breakpoints::BreakpointSpec::parse_logpoint(
        "/app/app.js:7=order is {order.id}",
    )
    .unwrap()];
    config.capture_locals = false;

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;
    assert!(result.is_success());

    let events = handle.lock().unwrap().clone();
    let types = event_types(&events);
    assert!(types.contains(&"logpoint_hit".to_string()));
    assert!(!types.contains(&"breakpoint_hit".to_string()));

    let hit = event_json(&events, "logpoint_hit");
    assert_eq!(hit["logOutput"], "order is 42");

    let end = event_json(&events, "session_end");
    assert_eq!(end["summary"]["breakpointsHit"], 0);
    adapter.await.unwrap();
}

/// The global timeout fires during a session that never stops.
#[tokio::test]
async fn test_global_timeout_ends_session_once() {
    // The program "runs" forever: launch responds, then nothing happens.
    let mock = MockDebuggee { hang_after_launch: true, ..MockDebuggee::default() };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.timeout = Duration::from_millis(300);

    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), EventFilter::default()).run().await;

    assert!(matches!(result.error, Some(dapdrive_session::SessionError::Timeout(_))));

    let events = handle.lock().unwrap().clone();
    let types = event_types(&events);
    assert!(types.contains(&"error".to_string()));
    assert_eq!(types.iter().filter(|t| *t == "session_end").count(), 1);
    assert_eq!(types.last().map(String::as_str), Some("session_end"));
    adapter.await.unwrap();
}

/// The event filter suppresses excluded types.
#[tokio::test]
async fn test_event_filter_suppresses_types() {
    let mock = MockDebuggee {
        frame_bodies: vec![frames(42)],
        initial_output: vec![("stdout".to_string(), "noise\n".to_string())],
        initial_stop: Some(stopped("breakpoint", Some(vec![1]))),
        exit_code: 0,
        emit_exited: true,
        ..MockDebuggee::default()
    };
    let (port, adapter) = start_mock(mock).await;

    let mut config = base_config(port);
    config.breakpoints =
        vec![dapdrive_breakpoints::BreakpointSpec::parse("/app/Program.cs:42").unwrap()];
    config.capture_locals = false;

    let filter = EventFilter::new(
        None,
        std::collections::HashSet::from(["program_output".to_string()]),
    );
    let sink = CollectSink::new();
    let handle = sink.handle();
    let result = SessionManager::new(config, Box::new(sink), filter).run().await;
    assert!(result.is_success());

    let types = event_types(&handle.lock().unwrap());
    assert!(!types.contains(&"program_output".to_string()));
    assert!(types.contains(&"breakpoint_hit".to_string()));
    adapter.await.unwrap();
}
