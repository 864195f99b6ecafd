//! The session manager: startup ordering, the event loop, stop handling,
//! stepping, tracing and assertions.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use dapdrive_breakpoints::{BreakpointRegistry, PathContext};
use dapdrive_client::{AttachParams, ClientEvent, ClientOptions, DapClient, LaunchParams};
use dapdrive_exception::{ExceptionAnalyzer, ExceptionChainEntry};
use dapdrive_protocol::StoppedEventBody;
use dapdrive_variables::{diff_locals, LocalsSnapshot, VariableInspector};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TraceConfig};
use crate::error::SessionError;
use crate::events::{
    Emitted, EventFilter, EventSink, ExceptionInfo, Location, SessionEvent, SessionSummary,
    StackFrameInfo, TraceConfigInfo,
};
use crate::truthy::is_truthy;

/// Bound on buffered console output lines, kept for logpoint attribution.
const RECENT_CONSOLE_MAX_LINES: usize = 64;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Connecting,
    Initializing,
    Configuring,
    Running,
    Stopped,
    Terminated,
}

/// What the session does with the next `step` stop.
enum ControlMode {
    Idle,
    Stepping { remaining: u32 },
    Tracing(TraceState),
    EvalAfterStep(PendingHit),
}

/// Live trace-mode bookkeeping.
struct TraceState {
    thread_id: i64,
    initial_depth: usize,
    path: Vec<Location>,
    steps: usize,
    snapshot: Option<LocalsSnapshot>,
    config: TraceConfig,
}

/// A breakpoint hit deferred by eval-after-step: the original location is
/// reported with the post-step evaluations.
struct PendingHit {
    id: Option<i64>,
    thread_id: i64,
    location: Location,
    stack: Vec<StackFrameInfo>,
    locals: LocalsSnapshot,
}

/// What a finished session hands back to the run wrapper.
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// The stored fatal error, absent on clean completion.
    pub error: Option<SessionError>,
    /// The same summary that went into `session_end`.
    pub summary: SessionSummary,
}

impl SessionResult {
    /// Whether the session completed without a stored error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives one debug session from connect to disposal.
pub struct SessionManager {
    config: SessionConfig,
    sink: Box<dyn EventSink>,
    filter: EventFilter,
    state: SessionState,
    control: ControlMode,
    registry: BreakpointRegistry,
    inspector: VariableInspector,
    analyzer: ExceptionAnalyzer,
    client: Option<DapClient>,
    events: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    started_at: Instant,
    exit_code: Option<i64>,
    breakpoints_hit: u64,
    exceptions_caught: u64,
    steps_executed: u64,
    session_error: Option<SessionError>,
    session_end_emitted: bool,
    saw_terminated: bool,
    recent_console: VecDeque<String>,
}

impl SessionManager {
    /// Builds a manager for one immutable configuration. Breakpoint paths
    /// are resolved here, against the configured working directory, the
    /// program directory, then the process cwd.
    pub fn new(config: SessionConfig, sink: Box<dyn EventSink>, filter: EventFilter) -> Self {
        let context =
            PathContext { cwd: config.cwd.clone(), program_dir: config.program_dir() };
        let mut specs = config.breakpoints.clone();
        for spec in &mut specs {
            spec.resolve_path(&context);
        }
        let registry = BreakpointRegistry::new(specs);
        let inspector = VariableInspector::new(config.inspector.clone());
        let analyzer = ExceptionAnalyzer::new(config.exception_max_depth);

        Self {
            config,
            sink,
            filter,
            state: SessionState::Created,
            control: ControlMode::Idle,
            registry,
            inspector,
            analyzer,
            client: None,
            events: None,
            started_at: Instant::now(),
            exit_code: None,
            breakpoints_hit: 0,
            exceptions_caught: 0,
            steps_executed: 0,
            session_error: None,
            session_end_emitted: false,
            saw_terminated: false,
            recent_console: VecDeque::new(),
        }
    }

    /// Runs the session to completion.
    ///
    /// Never fails: fatal conditions (startup failure, the global timeout,
    /// an assertion violation) are stored in the result and `session_end`
    /// is emitted exactly once on every path, so a timeout racing the
    /// startup sequence cannot produce an unobserved failure.
    pub async fn run(mut self) -> SessionResult {
        self.started_at = Instant::now();
        self.emit_session_start();

        if let Err(err) = self.config.validate() {
            self.fail(err);
        } else {
            let timeout = self.config.timeout;
            match tokio::time::timeout(timeout, self.drive()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.fail(err),
                Err(_) => self.fail(SessionError::Timeout(timeout)),
            }
        }

        self.state = SessionState::Terminated;
        self.emit_session_end();
        self.cleanup().await;

        SessionResult { error: self.session_error.clone(), summary: self.summary() }
    }

    fn fail(&mut self, err: SessionError) {
        self.emit(SessionEvent::Error { message: err.to_string(), details: None });
        if self.session_error.is_none() {
            self.session_error = Some(err);
        }
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    async fn drive(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Connecting;
        let options = ClientOptions {
            request_timeout: self.config.request_timeout,
            initialized_timeout: self.config.initialized_timeout,
        };
        let (client, events) = DapClient::connect(self.config.profile.clone(), options)
            .await
            .map_err(|err| SessionError::Startup(err.to_string()))?;
        self.client = Some(client);
        self.events = Some(events);

        self.state = SessionState::Initializing;
        self.client()?
            .initialize()
            .await
            .map_err(|err| SessionError::Startup(format!("initialize failed: {err}")))?;

        self.state = SessionState::Configuring;
        if !self.config.profile.requires_launch_first {
            self.install_breakpoints().await?;
            self.install_exception_filters().await;
        }

        self.start_debuggee().await?;

        self.state = SessionState::Running;
        if self.config.is_attach() {
            let pid = self.config.pid.unwrap_or_default();
            info!("attached to pid {pid}");
            self.emit(SessionEvent::ProcessAttached { pid });
        } else {
            self.emit(SessionEvent::ProcessLaunched { pid: None });
        }

        self.event_loop().await;
        Ok(())
    }

    /// Launch or attach, observing the adapter's ordering policy.
    async fn start_debuggee(&mut self) -> Result<(), SessionError> {
        let client = self.client()?;
        let command = if self.config.is_attach() { "attach" } else { "launch" };
        let arguments = self.start_arguments();

        if self.config.profile.is_socket() {
            // Supervisor family: configurationDone precedes launch.
            client
                .configuration_done()
                .await
                .map_err(|err| SessionError::Startup(format!("configurationDone failed: {err}")))?;
            self.send_start_request(&client, command, arguments).await
        } else if self.config.profile.requires_launch_first {
            // Dynamic-language family: the adapter sends `initialized`
            // only after launch, so the launch response is held open
            // while breakpoints are installed.
            let launch_client = client.clone();
            let launch_command = command.to_string();
            let launch_arguments = arguments.clone();
            let launch = tokio::spawn(async move {
                if launch_command == "attach" {
                    launch_client.attach(launch_arguments).await
                } else {
                    launch_client.launch(launch_arguments).await
                }
            });

            if !client.wait_for_initialized(self.config.initialized_timeout).await {
                warn!(
                    "'initialized' did not arrive within {:?} after {command}; proceeding",
                    self.config.initialized_timeout
                );
            }
            self.install_breakpoints().await?;
            self.install_exception_filters().await;
            client
                .configuration_done()
                .await
                .map_err(|err| SessionError::Startup(format!("configurationDone failed: {err}")))?;

            match launch.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(SessionError::Startup(format!("{command} failed: {err}"))),
                Err(join) => Err(SessionError::Startup(format!("{command} task failed: {join}"))),
            }
        } else {
            // Native-debugger family: launch, then configurationDone.
            self.send_start_request(&client, command, arguments).await?;
            client
                .configuration_done()
                .await
                .map_err(|err| SessionError::Startup(format!("configurationDone failed: {err}")))?;
            Ok(())
        }
    }

    fn start_arguments(&self) -> serde_json::Value {
        if self.config.is_attach() {
            let params = AttachParams { pid: self.config.pid.unwrap_or_default() };
            (self.config.profile.attach_args)(&params)
        } else {
            let params = LaunchParams {
                program: self
                    .config
                    .program
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                args: self.config.program_args.clone(),
                cwd: self.config.cwd.as_ref().map(|p| p.to_string_lossy().into_owned()),
                env: self.config.env.clone(),
                stop_on_entry: false,
            };
            (self.config.profile.launch_args)(&params)
        }
    }

    async fn send_start_request(
        &mut self,
        client: &DapClient,
        command: &str,
        arguments: serde_json::Value,
    ) -> Result<(), SessionError> {
        let result = if command == "attach" {
            client.attach(arguments).await
        } else {
            client.launch(arguments).await
        };
        result.map_err(|err| SessionError::Startup(format!("{command} failed: {err}")))
    }

    async fn install_breakpoints(&mut self) -> Result<(), SessionError> {
        if self.registry.is_empty() {
            return Ok(());
        }
        let client = self.client()?;
        let reports = self.registry.install_all(&client).await;
        for report in reports {
            self.emit(SessionEvent::BreakpointSet {
                id: report.id,
                file: report.file,
                line: report.line,
                verified: report.verified,
                condition: report.condition,
                message: report.message,
            });
        }
        Ok(())
    }

    /// Activates configured exception filters, dropping tags the profile
    /// does not advertise. Failures degrade to an `error` event.
    async fn install_exception_filters(&mut self) {
        if self.config.exception_filters.is_empty() {
            return;
        }
        let supported = &self.config.profile.exception_filters;
        let filters: Vec<String> = self
            .config
            .exception_filters
            .iter()
            .filter(|tag| {
                let known = supported.is_empty() || supported.contains(*tag);
                if !known {
                    warn!("dropping exception filter '{tag}': not supported by this adapter");
                }
                known
            })
            .cloned()
            .collect();
        if filters.is_empty() {
            return;
        }

        let Ok(client) = self.client() else {
            return;
        };
        match client.set_exception_breakpoints(filters.clone()).await {
            Ok(()) => self.emit(SessionEvent::ExceptionBreakpointSet { filters }),
            Err(err) => self.emit(SessionEvent::Error {
                message: format!("setExceptionBreakpoints failed: {err}"),
                details: None,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    async fn event_loop(&mut self) {
        loop {
            if self.state == SessionState::Terminated {
                return;
            }
            let event = match self.events.as_mut() {
                Some(events) => events.recv().await,
                None => None,
            };
            let Some(event) = event else {
                self.handle_transport_closed();
                return;
            };
            self.handle_client_event(event).await;
        }
    }

    async fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Stopped(body) => {
                self.state = SessionState::Stopped;
                let thread_id = body.thread_id.unwrap_or(1);
                if let Err(err) = self.on_stopped(body).await {
                    // One failed stop must not end the session.
                    self.emit(SessionEvent::Error {
                        message: format!("stop handling failed: {err}"),
                        details: None,
                    });
                    self.control = ControlMode::Idle;
                    self.try_continue(thread_id).await;
                }
                if self.state == SessionState::Stopped {
                    self.state = SessionState::Running;
                }
            }
            ClientEvent::Exited { exit_code } => {
                self.exit_code = Some(exit_code);
                let duration_ms = self.started_at.elapsed().as_millis() as u64;
                self.emit(SessionEvent::ProcessExited { exit_code, duration_ms });
            }
            ClientEvent::Terminated => {
                self.saw_terminated = true;
                self.state = SessionState::Terminated;
            }
            ClientEvent::TransportClosed => self.handle_transport_closed(),
            ClientEvent::Output { category, output } => {
                if category == "console" {
                    if self.recent_console.len() >= RECENT_CONSOLE_MAX_LINES {
                        self.recent_console.pop_front();
                    }
                    self.recent_console.push_back(output.trim_end().to_string());
                }
                self.emit(SessionEvent::ProgramOutput { category, output });
            }
            ClientEvent::BreakpointChanged(body) => {
                self.registry.apply_adapter_update(&body.breakpoint);
            }
            ClientEvent::Stderr { line } => debug!("adapter stderr: {line}"),
            ClientEvent::ProcessExited { code } => {
                debug!("adapter process exited with {code:?}");
            }
            ClientEvent::Initialized => {}
            ClientEvent::Adapter { name, .. } => debug!("ignoring adapter event '{name}'"),
            ClientEvent::Error { message } => {
                self.emit(SessionEvent::Error { message, details: None });
            }
        }
    }

    fn handle_transport_closed(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;
        if !self.saw_terminated && self.exit_code.is_none() && self.session_error.is_none() {
            let err = SessionError::Transport("adapter connection closed unexpectedly".to_string());
            self.emit(SessionEvent::Error { message: err.to_string(), details: None });
            self.session_error = Some(err);
        }
    }

    // ------------------------------------------------------------------
    // Stop handling
    // ------------------------------------------------------------------

    async fn on_stopped(&mut self, body: StoppedEventBody) -> anyhow::Result<()> {
        let thread_id = match body.thread_id {
            Some(thread_id) => thread_id,
            None => self.first_thread().await,
        };
        let (stack, location, frame_id) = self.fetch_stack(thread_id).await;

        match body.reason.as_str() {
            "breakpoint" => {
                if let Some(ids) = body.hit_breakpoint_ids.as_ref() {
                    if !ids.is_empty() && ids.iter().all(|id| self.registry.is_logpoint(*id)) {
                        return self.handle_logpoint_stop(ids, thread_id, location).await;
                    }
                }
                self.preempt_control_mode("breakpoint", &location, &stack, frame_id).await;
                let hit_id =
                    body.hit_breakpoint_ids.as_ref().and_then(|ids| ids.first().copied());
                self.handle_breakpoint_stop(hit_id, thread_id, frame_id, location, stack).await
            }
            "exception" => {
                self.preempt_control_mode("exception", &location, &stack, frame_id).await;
                self.handle_exception_stop(&body, thread_id, frame_id, location, stack).await
            }
            "step" => {
                let mode = std::mem::replace(&mut self.control, ControlMode::Idle);
                match mode {
                    ControlMode::Stepping { remaining } => {
                        self.handle_step_stop(remaining, thread_id, frame_id, location, stack)
                            .await
                    }
                    ControlMode::Tracing(state) => {
                        self.handle_trace_step(state, thread_id, frame_id, location, stack).await
                    }
                    ControlMode::EvalAfterStep(pending) => {
                        self.handle_deferred_hit(pending, frame_id).await
                    }
                    ControlMode::Idle => {
                        self.handle_plain_stop(thread_id, frame_id, location, stack).await
                    }
                }
            }
            _ => self.handle_plain_stop(thread_id, frame_id, location, stack).await,
        }
    }

    /// A breakpoint or exception stop preempts whatever post-stop workflow
    /// was in flight for the expected `step` stop. A live trace ends with
    /// the preempting reason; a deferred eval-after-step hit is flushed
    /// here so it is never silently discarded; fixed-count stepping is
    /// abandoned and restarts from the new stop's own handling.
    async fn preempt_control_mode(
        &mut self,
        reason: &str,
        location: &Location,
        stack: &[StackFrameInfo],
        frame_id: Option<i64>,
    ) {
        match std::mem::replace(&mut self.control, ControlMode::Idle) {
            ControlMode::Tracing(state) => {
                self.end_trace(state, reason, location.clone(), stack.to_vec(), frame_id).await;
            }
            ControlMode::EvalAfterStep(pending) => {
                self.flush_deferred_hit(pending, frame_id).await;
            }
            ControlMode::Stepping { .. } | ControlMode::Idle => {}
        }
    }

    /// Emits a deferred breakpoint hit without scheduling a follow-up
    /// action: the preempting stop decides what happens next. The
    /// evaluations come from the current frame, which is where the
    /// deferred step actually landed.
    async fn flush_deferred_hit(&mut self, pending: PendingHit, frame_id: Option<i64>) {
        let evaluations = self.evaluate_watches(frame_id).await;
        self.emit(SessionEvent::BreakpointHit {
            id: pending.id,
            thread_id: pending.thread_id,
            location: pending.location,
            stack_trace: pending.stack,
            locals: pending.locals,
            evaluations,
        });
        self.breakpoints_hit += 1;
    }

    async fn handle_logpoint_stop(
        &mut self,
        hit_ids: &[i64],
        thread_id: i64,
        location: Location,
    ) -> anyhow::Result<()> {
        // The adapter expands the message template and emits it via an
        // `output` event; the freshest console line is that expansion.
        let log_output = self
            .recent_console
            .back()
            .cloned()
            .or_else(|| {
                hit_ids
                    .first()
                    .and_then(|id| self.registry.find_by_id(*id))
                    .and_then(|bp| bp.spec.log_message.clone())
            })
            .unwrap_or_default();
        self.emit(SessionEvent::LogpointHit {
            id: hit_ids.first().copied(),
            thread_id,
            location,
            log_output,
        });
        self.client()?.continue_thread(thread_id).await?;
        Ok(())
    }

    async fn handle_breakpoint_stop(
        &mut self,
        hit_id: Option<i64>,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
    ) -> anyhow::Result<()> {
        if self.config.eval_after_step && !self.config.evaluations.is_empty() {
            // Defer: one step, then evaluate and report the original site.
            let locals = self.capture_locals(frame_id).await;
            self.control = ControlMode::EvalAfterStep(PendingHit {
                id: hit_id,
                thread_id,
                location,
                stack,
                locals,
            });
            self.client()?.next(thread_id).await?;
            return Ok(());
        }

        let locals = self.capture_locals(frame_id).await;
        let evaluations = self.evaluate_watches(frame_id).await;
        self.emit(SessionEvent::BreakpointHit {
            id: hit_id,
            thread_id,
            location: location.clone(),
            stack_trace: stack.clone(),
            locals: locals.clone(),
            evaluations,
        });
        self.breakpoints_hit += 1;

        if self.check_assertions(thread_id, frame_id, &location, &stack, Some(&locals)).await {
            return Ok(());
        }
        self.after_hit(thread_id, frame_id, location, stack, locals).await
    }

    /// The post-hit action: trace mode, fixed-count stepping, or resume.
    async fn after_hit(
        &mut self,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
        locals: LocalsSnapshot,
    ) -> anyhow::Result<()> {
        let _ = frame_id;
        if let Some(trace) = self.config.trace.clone() {
            self.start_trace(trace, thread_id, location, stack, locals).await
        } else if let Some(steps) = self.config.steps.filter(|n| *n > 0) {
            self.control = ControlMode::Stepping { remaining: steps };
            self.client()?.next(thread_id).await?;
            Ok(())
        } else {
            self.control = ControlMode::Idle;
            self.client()?.continue_thread(thread_id).await?;
            Ok(())
        }
    }

    async fn handle_step_stop(
        &mut self,
        remaining: u32,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
    ) -> anyhow::Result<()> {
        let remaining = remaining.saturating_sub(1);
        self.steps_executed += 1;

        let locals = self.capture_locals(frame_id).await;
        if self.check_assertions(thread_id, frame_id, &location, &stack, Some(&locals)).await {
            return Ok(());
        }
        self.emit(SessionEvent::StepCompleted {
            thread_id,
            location,
            stack_trace: stack,
            locals,
        });

        if remaining > 0 {
            self.control = ControlMode::Stepping { remaining };
            self.client()?.next(thread_id).await?;
        } else {
            self.client()?.continue_thread(thread_id).await?;
        }
        Ok(())
    }

    /// Completes an eval-after-step deferral: the breakpoint event carries
    /// the original location with the post-step evaluations.
    async fn handle_deferred_hit(
        &mut self,
        pending: PendingHit,
        frame_id: Option<i64>,
    ) -> anyhow::Result<()> {
        let evaluations = self.evaluate_watches(frame_id).await;
        self.emit(SessionEvent::BreakpointHit {
            id: pending.id,
            thread_id: pending.thread_id,
            location: pending.location.clone(),
            stack_trace: pending.stack.clone(),
            locals: pending.locals.clone(),
            evaluations,
        });
        self.breakpoints_hit += 1;

        if self
            .check_assertions(
                pending.thread_id,
                frame_id,
                &pending.location,
                &pending.stack,
                Some(&pending.locals),
            )
            .await
        {
            return Ok(());
        }
        self.after_hit(pending.thread_id, frame_id, pending.location, pending.stack, pending.locals)
            .await
    }

    async fn handle_exception_stop(
        &mut self,
        body: &StoppedEventBody,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
    ) -> anyhow::Result<()> {
        // No step is outstanding once an exception is being reported.
        self.control = ControlMode::Idle;
        let locals = self.capture_locals(frame_id).await;
        let analysis = self.analyzer.analyze(&locals);

        let exception = match &analysis {
            Some(analysis) if !analysis.chain.is_empty() => {
                exception_info_from_chain(&analysis.chain)
            }
            _ => ExceptionInfo {
                exception_type: body
                    .description
                    .clone()
                    .unwrap_or_else(|| "Exception".to_string()),
                message: body.text.clone(),
                stack_trace: None,
                inner_exception: None,
            },
        };

        let (exception_chain, root_cause) = match analysis {
            Some(analysis) => (Some(analysis.chain), analysis.root_cause),
            None => (None, None),
        };
        self.emit(SessionEvent::ExceptionThrown {
            thread_id,
            exception,
            location: location.clone(),
            locals: locals.clone(),
            exception_chain,
            root_cause,
        });
        self.exceptions_caught += 1;

        if self.check_assertions(thread_id, frame_id, &location, &stack, Some(&locals)).await {
            return Ok(());
        }
        self.client()?.continue_thread(thread_id).await?;
        Ok(())
    }

    /// Fallback for stop reasons without dedicated handling: report what
    /// is known and resume.
    async fn handle_plain_stop(
        &mut self,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
    ) -> anyhow::Result<()> {
        let locals = self.capture_locals(frame_id).await;
        let evaluations = self.evaluate_watches(frame_id).await;
        self.emit(SessionEvent::BreakpointHit {
            id: None,
            thread_id,
            location: location.clone(),
            stack_trace: stack.clone(),
            locals: locals.clone(),
            evaluations,
        });
        if self.check_assertions(thread_id, frame_id, &location, &stack, Some(&locals)).await {
            return Ok(());
        }
        self.client()?.continue_thread(thread_id).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trace mode
    // ------------------------------------------------------------------

    async fn start_trace(
        &mut self,
        config: TraceConfig,
        thread_id: i64,
        location: Location,
        stack: Vec<StackFrameInfo>,
        locals: LocalsSnapshot,
    ) -> anyhow::Result<()> {
        let state = TraceState {
            thread_id,
            initial_depth: stack.len(),
            path: vec![location.clone()],
            steps: 0,
            snapshot: config.diff_vars.then_some(locals),
            config: config.clone(),
        };
        self.emit(SessionEvent::TraceStarted {
            thread_id,
            start_location: location,
            initial_stack_depth: stack.len(),
            trace_config: TraceConfigInfo {
                step_into: config.step_into,
                limit: config.limit,
                until_expression: config.until.clone(),
            },
        });
        self.issue_trace_step(&config, thread_id).await?;
        self.control = ControlMode::Tracing(state);
        Ok(())
    }

    async fn handle_trace_step(
        &mut self,
        mut state: TraceState,
        thread_id: i64,
        frame_id: Option<i64>,
        location: Location,
        stack: Vec<StackFrameInfo>,
    ) -> anyhow::Result<()> {
        state.steps += 1;
        self.steps_executed += 1;
        state.path.push(location.clone());

        if state.config.diff_vars {
            let current = self.capture_locals(frame_id).await;
            let previous = state.snapshot.take().unwrap_or_default();
            let changes = diff_locals(&previous, &current);
            self.emit(SessionEvent::TraceStep {
                thread_id,
                step_number: state.steps,
                location: location.clone(),
                stack_depth: None,
                changes: (!changes.is_empty()).then_some(changes),
            });
            state.snapshot = Some(current);
        } else {
            self.emit(SessionEvent::TraceStep {
                thread_id,
                step_number: state.steps,
                location: location.clone(),
                stack_depth: Some(stack.len()),
                changes: None,
            });
        }

        if self.check_assertions(thread_id, frame_id, &location, &stack, None).await {
            return Ok(());
        }

        // Stop conditions, in order: step limit, function return, until
        // expression.
        let stop_reason = if state.steps >= state.config.limit {
            Some("limit_reached")
        } else if stack.len() < state.initial_depth {
            Some("function_return")
        } else if self.trace_until_fired(&state.config, frame_id).await {
            Some("expression_true")
        } else {
            None
        };

        match stop_reason {
            Some(reason) => {
                let resume_thread = state.thread_id;
                self.end_trace(state, reason, location, stack, frame_id).await;
                self.client()?.continue_thread(resume_thread).await?;
                Ok(())
            }
            None => {
                let config = state.config.clone();
                self.issue_trace_step(&config, thread_id).await?;
                self.control = ControlMode::Tracing(state);
                Ok(())
            }
        }
    }

    async fn trace_until_fired(&mut self, config: &TraceConfig, frame_id: Option<i64>) -> bool {
        let Some(until) = &config.until else {
            return false;
        };
        let Ok(client) = self.client() else {
            return false;
        };
        match client.evaluate(until, frame_id, "watch").await {
            Ok(body) => is_truthy(&body.result),
            Err(err) => {
                debug!("trace-until '{until}' evaluation failed: {err}");
                false
            }
        }
    }

    /// Emits `trace_completed` and resets trace state. Resuming the
    /// thread (or not, for breakpoint/exception interruptions) is the
    /// caller's decision.
    async fn end_trace(
        &mut self,
        state: TraceState,
        stop_reason: &str,
        final_location: Location,
        stack: Vec<StackFrameInfo>,
        frame_id: Option<i64>,
    ) {
        let locals = self.capture_locals(frame_id).await;
        let evaluations = self.evaluate_watches(frame_id).await;
        self.emit(SessionEvent::TraceCompleted {
            thread_id: state.thread_id,
            stop_reason: stop_reason.to_string(),
            steps_executed: state.steps,
            path: state.path,
            final_location,
            stack_trace: stack,
            locals,
            evaluations,
        });
        self.control = ControlMode::Idle;
    }

    async fn issue_trace_step(
        &mut self,
        config: &TraceConfig,
        thread_id: i64,
    ) -> anyhow::Result<()> {
        let client = self.client()?;
        if config.step_into {
            client.step_in(thread_id).await?;
        } else {
            client.next(thread_id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    /// Evaluates every assertion; the first non-truthy result (or
    /// evaluation failure) emits `assertion_failed` and ends the session.
    /// Returns whether the session ended.
    async fn check_assertions(
        &mut self,
        thread_id: i64,
        frame_id: Option<i64>,
        location: &Location,
        stack: &[StackFrameInfo],
        locals: Option<&LocalsSnapshot>,
    ) -> bool {
        if self.config.assertions.is_empty() {
            return false;
        }
        let Ok(client) = self.client() else {
            return false;
        };

        let assertions = self.config.assertions.clone();
        for assertion in assertions {
            let (failed, mut actual_value, evaluation_error) =
                match client.evaluate(&assertion, frame_id, "watch").await {
                    Ok(body) if is_truthy(&body.result) => (false, None, None),
                    Ok(body) => (true, Some(body.result), None),
                    Err(err) => (true, None, Some(err.to_string())),
                };
            if !failed {
                continue;
            }

            // For comparison assertions the interesting value is the left
            // operand, not the boolean rendering.
            if let Some(lhs) = comparison_lhs(&assertion) {
                if let Ok(body) = client.evaluate(lhs, frame_id, "watch").await {
                    actual_value = Some(body.result);
                }
            }

            let locals = match locals {
                Some(locals) => locals.clone(),
                None => self.capture_locals(frame_id).await,
            };
            self.emit(SessionEvent::AssertionFailed {
                thread_id,
                assertion: assertion.clone(),
                actual_value,
                evaluation_error,
                location: location.clone(),
                stack_trace: stack.to_vec(),
                locals,
            });
            self.session_error = Some(SessionError::AssertionFailed(assertion));
            self.state = SessionState::Terminated;
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Inspection helpers
    // ------------------------------------------------------------------

    /// Some adapters omit `threadId` on stopped events; ask for the
    /// thread list and take the first entry.
    async fn first_thread(&mut self) -> i64 {
        let Ok(client) = self.client() else {
            return 1;
        };
        match client.threads().await {
            Ok(threads) => threads.first().map(|t| t.id).unwrap_or(1),
            Err(err) => {
                debug!("threads fallback failed: {err}");
                1
            }
        }
    }

    async fn fetch_stack(
        &mut self,
        thread_id: i64,
    ) -> (Vec<StackFrameInfo>, Location, Option<i64>) {
        let Ok(client) = self.client() else {
            return (Vec::new(), Location::default(), None);
        };
        match client.stack_trace(thread_id, Some(self.config.max_stack_frames)).await {
            Ok(body) => {
                let frames: Vec<StackFrameInfo> =
                    body.stack_frames.iter().map(StackFrameInfo::from_protocol).collect();
                let location =
                    frames.first().map(StackFrameInfo::location).unwrap_or_default();
                let frame_id = frames.first().map(|f| f.id);
                (frames, location, frame_id)
            }
            Err(err) => {
                debug!("stackTrace failed for thread {thread_id}: {err}");
                (Vec::new(), Location::default(), None)
            }
        }
    }

    async fn capture_locals(&mut self, frame_id: Option<i64>) -> LocalsSnapshot {
        if !self.config.capture_locals {
            return LocalsSnapshot::new();
        }
        let Some(frame_id) = frame_id else {
            return LocalsSnapshot::new();
        };
        let Ok(client) = self.client() else {
            return LocalsSnapshot::new();
        };
        self.inspector.get_locals(&client, frame_id).await
    }

    async fn evaluate_watches(
        &mut self,
        frame_id: Option<i64>,
    ) -> Option<IndexMap<String, dapdrive_variables::EvaluationResult>> {
        if self.config.evaluations.is_empty() {
            return None;
        }
        let Ok(client) = self.client() else {
            return None;
        };
        Some(
            self.inspector
                .evaluate(&client, frame_id.unwrap_or(0), &self.config.evaluations)
                .await,
        )
    }

    async fn try_continue(&mut self, thread_id: i64) {
        if let Ok(client) = self.client() {
            if let Err(err) = client.continue_thread(thread_id).await {
                debug!("recovery continue failed: {err}");
            }
        }
    }

    fn client(&self) -> Result<DapClient, SessionError> {
        self.client
            .clone()
            .ok_or_else(|| SessionError::Startup("client not connected".to_string()))
    }

    // ------------------------------------------------------------------
    // Emission and teardown
    // ------------------------------------------------------------------

    fn emit_session_start(&mut self) {
        let attach = self.config.is_attach();
        self.emit(SessionEvent::SessionStart {
            adapter: self.config.profile.id.clone(),
            program: self
                .config
                .program
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            pid: self.config.pid,
            args: (!self.config.program_args.is_empty())
                .then(|| self.config.program_args.clone()),
            cwd: self.config.cwd.as_ref().map(|p| p.to_string_lossy().into_owned()),
            attach: attach.then_some(true),
        });
    }

    fn emit_session_end(&mut self) {
        let summary = self.summary();
        self.emit(SessionEvent::SessionEnd { summary });
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            duration_ms: self.started_at.elapsed().as_millis() as u64,
            exit_code: self.exit_code,
            breakpoints_hit: self.breakpoints_hit,
            exceptions_caught: self.exceptions_caught,
            steps_executed: self.steps_executed,
        }
    }

    /// Stamps, filters and writes one event. `session_end` is absorbed
    /// after its first emission regardless of filtering.
    fn emit(&mut self, event: SessionEvent) {
        if matches!(event, SessionEvent::SessionEnd { .. }) {
            if self.session_end_emitted {
                return;
            }
            self.session_end_emitted = true;
        }
        if !self.filter.allows(event.type_name()) {
            return;
        }
        let emitted = Emitted {
            event,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.sink.emit(&emitted);
    }

    /// Disconnects the client, terminating the debuggee only in launch
    /// mode. Errors here are irrelevant to the session outcome.
    async fn cleanup(&mut self) {
        self.events = None;
        if let Some(client) = self.client.take() {
            let terminate_debuggee = !self.config.is_attach();
            client.disconnect(terminate_debuggee, false).await;
        }
    }
}

/// The left operand of a comparison assertion, when the expression has
/// one at its top level.
fn comparison_lhs(expression: &str) -> Option<&str> {
    for operator in ["<=", ">=", "==", "!=", "<", ">"] {
        if let Some((lhs, _)) = expression.split_once(operator) {
            let lhs = lhs.trim();
            if !lhs.is_empty() && !lhs.ends_with(['<', '>', '=', '!']) {
                return Some(lhs);
            }
        }
    }
    None
}

/// Nests the flattened chain back into the `exception{...}` shape of the
/// `exception_thrown` event.
fn exception_info_from_chain(chain: &[ExceptionChainEntry]) -> ExceptionInfo {
    fn build(entries: &[ExceptionChainEntry]) -> Option<Box<ExceptionInfo>> {
        let (first, rest) = entries.split_first()?;
        Some(Box::new(ExceptionInfo {
            exception_type: first.exception_type.clone(),
            message: first.message.clone(),
            stack_trace: first.throw_site.clone(),
            inner_exception: build(rest),
        }))
    }
    match build(chain) {
        Some(info) => *info,
        None => ExceptionInfo {
            exception_type: "Exception".to_string(),
            message: None,
            stack_trace: None,
            inner_exception: None,
        },
    }
}
