//! The client proper: bootstrap, typed requests, event relay, routing.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use dapdrive_breakpoints::{BreakpointTarget, TargetError};
use dapdrive_protocol::{
    Breakpoint, BreakpointEventBody, Capabilities, ContinueResponseBody, DisconnectArguments,
    EvaluateArguments, EvaluateResponseBody, ExitedEventBody, InitializeRequestArguments,
    OutputEventBody, ProtocolVariable, Scope, ScopesArguments, ScopesResponseBody,
    SetBreakpointsArguments, SetBreakpointsResponseBody, SetExceptionBreakpointsArguments, Source,
    SourceBreakpoint, StackTraceArguments, StackTraceResponseBody, StoppedEventBody, Thread,
    ThreadControlArguments, ThreadsResponseBody, VariablesArguments, VariablesResponseBody,
};
use dapdrive_transport::{Transport, TransportConfig, TransportError, TransportEvent};
use dapdrive_variables::{SourceError, VariableSource};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::handshake::answer_handshake;
use crate::profile::{AdapterProfile, TransportKind};

/// Timeout for the graceful `disconnect` request before hard close.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-level errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A transport operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The adapter profile cannot be used as configured.
    #[error("adapter profile error: {0}")]
    Profile(String),
    /// Spawning the adapter server process failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A response body did not have the expected shape.
    #[error("malformed {command} response: {error}")]
    MalformedResponse {
        /// The request whose response failed to decode.
        command: String,
        /// Decode error text.
        error: String,
    },
}

/// Everything the client relays to its owner.
#[derive(Debug)]
pub enum ClientEvent {
    /// The adapter announced it is ready for configuration.
    Initialized,
    /// A thread stopped.
    Stopped(StoppedEventBody),
    /// The debug session is over.
    Terminated,
    /// The debuggee exited.
    Exited {
        /// Debuggee exit code.
        exit_code: i64,
    },
    /// Debuggee or adapter output.
    Output {
        /// `stdout`, `stderr` or `console`.
        category: String,
        /// The text.
        output: String,
    },
    /// Adapter-side breakpoint state change.
    BreakpointChanged(BreakpointEventBody),
    /// Any adapter event the client does not model.
    Adapter {
        /// Event name.
        name: String,
        /// Raw body.
        body: Option<Value>,
    },
    /// A line of the adapter process's stderr.
    Stderr {
        /// The line.
        line: String,
    },
    /// The adapter process exited.
    ProcessExited {
        /// Exit code, when available.
        code: Option<i32>,
    },
    /// The parent transport closed.
    TransportClosed,
    /// A non-fatal client-level problem (frame parse failures and the like).
    Error {
        /// Problem description.
        message: String,
    },
}

/// Tunables for a client instance.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Bounded wait for the adapter's `initialized` event.
    pub initialized_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            initialized_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TransportRole {
    Parent,
    Child,
}

pub(crate) struct ClientInner {
    pub(crate) profile: AdapterProfile,
    pub(crate) parent: Transport,
    pub(crate) child: RwLock<Option<Transport>>,
    /// Adapter server process for socket transports started by us.
    server_process: StdMutex<Option<tokio::process::Child>>,
    capabilities: StdRwLock<Capabilities>,
    initialized: AtomicBool,
    initialized_notify: Notify,
    pub(crate) child_initialized: AtomicBool,
    pub(crate) child_init_notify: Notify,
    /// Last breakpoints set on the parent, replayed onto child sessions.
    pub(crate) last_breakpoints: RwLock<IndexMap<String, Vec<SourceBreakpoint>>>,
    /// Last exception filters set on the parent, replayed onto children.
    pub(crate) last_exception_filters: RwLock<Option<Vec<String>>>,
    pub(crate) events_tx: mpsc::UnboundedSender<ClientEvent>,
    pub(crate) options: ClientOptions,
    pub(crate) transport_config: TransportConfig,
}

/// Typed DAP operations over one adapter. Cheap to clone.
#[derive(Clone)]
pub struct DapClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl DapClient {
    /// Bootstraps the adapter described by `profile` and returns the
    /// client plus its event stream.
    ///
    /// stdio profiles are spawned directly. Socket profiles start the
    /// server command when one is configured, wait the profile's connect
    /// delay, then open the socket; with no command the adapter is
    /// assumed to be running already.
    pub async fn connect(
        profile: AdapterProfile,
        options: ClientOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let transport_config = TransportConfig { request_timeout: options.request_timeout };
        let mut server_process = None;

        let (transport, transport_rx) = match &profile.transport {
            TransportKind::ChildProcessStdio => {
                let command = profile.command.as_deref().ok_or_else(|| {
                    ClientError::Profile(format!("profile '{}' has no adapter command", profile.id))
                })?;
                Transport::spawn(command, &profile.args, &HashMap::new(), transport_config.clone())
                    .await?
            }
            TransportKind::ClientSocket { host, port, connect_delay } => {
                if let Some(command) = &profile.command {
                    info!("starting adapter server: {command}");
                    let child = tokio::process::Command::new(command)
                        .args(&profile.args)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .kill_on_drop(true)
                        .spawn()?;
                    server_process = Some(child);
                    tokio::time::sleep(*connect_delay).await;
                }
                Transport::connect(host, *port, transport_config.clone()).await?
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ClientInner {
            profile,
            parent: transport,
            child: RwLock::new(None),
            server_process: StdMutex::new(server_process),
            capabilities: StdRwLock::new(Capabilities::default()),
            initialized: AtomicBool::new(false),
            initialized_notify: Notify::new(),
            child_initialized: AtomicBool::new(false),
            child_init_notify: Notify::new(),
            last_breakpoints: RwLock::new(IndexMap::new()),
            last_exception_filters: RwLock::new(None),
            events_tx,
            options,
            transport_config,
        });

        tokio::spawn(relay_loop(Arc::clone(&inner), transport_rx, TransportRole::Parent));

        Ok((Self { inner }, events_rx))
    }

    /// The adapter's capabilities as stored from `initialize`.
    pub fn capabilities(&self) -> Capabilities {
        self.inner
            .capabilities
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sends `initialize` and stores the returned capabilities.
    ///
    /// For adapters that announce readiness right away, this also waits
    /// (bounded) for the `initialized` event and proceeds either way;
    /// launch-first adapters send it only after `launch`/`attach`, so the
    /// wait happens later in the startup sequence.
    pub async fn initialize(&self) -> Result<Capabilities, ClientError> {
        let arguments = InitializeRequestArguments {
            client_id: Some("dapdrive".to_string()),
            client_name: Some("dapdrive".to_string()),
            adapter_id: self.inner.profile.id.clone(),
            locale: Some("en-US".to_string()),
            lines_start_at1: Some(true),
            columns_start_at1: Some(true),
            path_format: Some("path".to_string()),
            supports_variable_type: Some(true),
            supports_variable_paging: Some(true),
            supports_run_in_terminal_request: Some(false),
            supports_start_debugging_request: Some(true),
        };
        let body = self
            .inner
            .parent
            .send_request("initialize", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;

        let capabilities: Capabilities = match body {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Capabilities::default(),
        };
        *self.inner.capabilities.write().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            capabilities.clone();

        if !self.inner.profile.requires_launch_first
            && !self.wait_for_initialized(self.inner.options.initialized_timeout).await
        {
            warn!(
                "adapter '{}' did not send 'initialized' within {:?}; proceeding",
                self.inner.profile.id, self.inner.options.initialized_timeout
            );
        }
        Ok(capabilities)
    }

    /// Waits for the adapter's `initialized` event, bounded. Returns
    /// whether the event has been seen.
    pub async fn wait_for_initialized(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.initialized.load(Ordering::SeqCst) {
                return true;
            }
            let notified = self.inner.initialized_notify.notified();
            if self.inner.initialized.load(Ordering::SeqCst) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.initialized.load(Ordering::SeqCst);
            }
        }
    }

    /// Sends `launch` with profile-built arguments.
    pub async fn launch(&self, arguments: Value) -> Result<(), ClientError> {
        self.inner.parent.send_request("launch", Some(arguments)).await?;
        Ok(())
    }

    /// Sends `attach` with profile-built arguments.
    pub async fn attach(&self, arguments: Value) -> Result<(), ClientError> {
        self.inner.parent.send_request("attach", Some(arguments)).await?;
        Ok(())
    }

    /// Signals the end of the configuration phase.
    pub async fn configuration_done(&self) -> Result<(), ClientError> {
        self.inner.parent.send_request("configurationDone", None).await?;
        Ok(())
    }

    /// Replaces the breakpoint list of one source. Administrative: always
    /// sent on the parent transport, and cached for child-session replay.
    pub async fn set_breakpoints(
        &self,
        source_path: &str,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>, ClientError> {
        self.inner
            .last_breakpoints
            .write()
            .await
            .insert(source_path.to_string(), breakpoints.clone());

        let arguments = SetBreakpointsArguments {
            source: Source {
                path: Some(source_path.to_string()),
                name: source_name(source_path),
                source_reference: None,
            },
            breakpoints: Some(breakpoints),
            source_modified: Some(false),
        };
        let body = self
            .inner
            .parent
            .send_request("setBreakpoints", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;
        let decoded: SetBreakpointsResponseBody = decode_body("setBreakpoints", body)?;
        Ok(decoded.breakpoints)
    }

    /// Activates exception filters. Administrative: parent transport,
    /// cached for child-session replay.
    pub async fn set_exception_breakpoints(
        &self,
        filters: Vec<String>,
    ) -> Result<(), ClientError> {
        *self.inner.last_exception_filters.write().await = Some(filters.clone());
        let arguments = SetExceptionBreakpointsArguments { filters };
        self.inner
            .parent
            .send_request(
                "setExceptionBreakpoints",
                Some(serde_json::to_value(&arguments).unwrap_or_default()),
            )
            .await?;
        Ok(())
    }

    /// Lists the debuggee's threads.
    pub async fn threads(&self) -> Result<Vec<Thread>, ClientError> {
        let body = self.active_transport().await.send_request("threads", None).await?;
        let decoded: ThreadsResponseBody = decode_body("threads", body)?;
        Ok(decoded.threads)
    }

    /// Fetches a bounded stack trace for a thread.
    pub async fn stack_trace(
        &self,
        thread_id: i64,
        levels: Option<i64>,
    ) -> Result<StackTraceResponseBody, ClientError> {
        let arguments = StackTraceArguments { thread_id, start_frame: Some(0), levels };
        let body = self
            .active_transport()
            .await
            .send_request("stackTrace", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;
        decode_body("stackTrace", body)
    }

    /// Fetches the scopes of a frame.
    pub async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, ClientError> {
        let arguments = ScopesArguments { frame_id };
        let body = self
            .active_transport()
            .await
            .send_request("scopes", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;
        let decoded: ScopesResponseBody = decode_body("scopes", body)?;
        Ok(decoded.scopes)
    }

    /// Fetches children of a reference handle.
    pub async fn variables(
        &self,
        variables_reference: i64,
        count: Option<i64>,
    ) -> Result<Vec<ProtocolVariable>, ClientError> {
        let arguments = VariablesArguments { variables_reference, filter: None, start: None, count };
        let body = self
            .active_transport()
            .await
            .send_request("variables", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;
        let decoded: VariablesResponseBody = decode_body("variables", body)?;
        Ok(decoded.variables)
    }

    /// Evaluates an expression in a frame.
    pub async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<i64>,
        context: &str,
    ) -> Result<EvaluateResponseBody, ClientError> {
        let arguments = EvaluateArguments {
            expression: expression.to_string(),
            frame_id,
            context: Some(context.to_string()),
        };
        let body = self
            .active_transport()
            .await
            .send_request("evaluate", Some(serde_json::to_value(&arguments).unwrap_or_default()))
            .await?;
        decode_body("evaluate", body)
    }

    /// Resumes a thread.
    pub async fn continue_thread(&self, thread_id: i64) -> Result<(), ClientError> {
        let body = self
            .active_transport()
            .await
            .send_request("continue", Some(thread_arguments(thread_id)))
            .await?;
        // Tolerate adapters that omit the body entirely.
        let _: Option<ContinueResponseBody> =
            body.map(serde_json::from_value).transpose().ok().flatten();
        Ok(())
    }

    /// Steps over the current line.
    pub async fn next(&self, thread_id: i64) -> Result<(), ClientError> {
        self.active_transport().await.send_request("next", Some(thread_arguments(thread_id))).await?;
        Ok(())
    }

    /// Steps into the call at the current line.
    pub async fn step_in(&self, thread_id: i64) -> Result<(), ClientError> {
        self.active_transport()
            .await
            .send_request("stepIn", Some(thread_arguments(thread_id)))
            .await?;
        Ok(())
    }

    /// Steps out of the current function.
    pub async fn step_out(&self, thread_id: i64) -> Result<(), ClientError> {
        self.active_transport()
            .await
            .send_request("stepOut", Some(thread_arguments(thread_id)))
            .await?;
        Ok(())
    }

    /// Pauses a running thread.
    pub async fn pause(&self, thread_id: i64) -> Result<(), ClientError> {
        self.active_transport().await.send_request("pause", Some(thread_arguments(thread_id))).await?;
        Ok(())
    }

    /// Asks the adapter to terminate the debuggee.
    pub async fn terminate(&self) -> Result<(), ClientError> {
        self.inner.parent.send_request("terminate", Some(serde_json::json!({}))).await?;
        Ok(())
    }

    /// Disconnects: child transport first, then the parent, each with a
    /// graceful `disconnect` request before a hard close. Any adapter
    /// server process started at bootstrap is killed afterwards.
    pub async fn disconnect(&self, terminate_debuggee: bool, restart: bool) {
        let arguments = DisconnectArguments {
            restart: Some(restart),
            terminate_debuggee: Some(terminate_debuggee),
        };
        let arguments = serde_json::to_value(&arguments).unwrap_or_default();

        let child = self.inner.child.write().await.take();
        if let Some(child) = child {
            if child.is_open() {
                let _ = child
                    .send_request_with_timeout(
                        "disconnect",
                        Some(arguments.clone()),
                        DISCONNECT_TIMEOUT,
                    )
                    .await;
            }
            child.close().await;
        }

        if self.inner.parent.is_open() {
            let _ = self
                .inner
                .parent
                .send_request_with_timeout("disconnect", Some(arguments), DISCONNECT_TIMEOUT)
                .await;
        }
        self.inner.parent.close().await;

        let server = self
            .inner
            .server_process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(mut server) = server {
            let _ = server.start_kill();
        }
    }

    /// Whether the parent transport is still open.
    pub fn is_connected(&self) -> bool {
        self.inner.parent.is_open()
    }

    /// The transport debugging operations are routed to: the child
    /// session when one is active, the parent otherwise.
    pub(crate) async fn active_transport(&self) -> Transport {
        if let Some(child) = self.inner.child.read().await.as_ref() {
            if child.is_open() {
                return child.clone();
            }
        }
        self.inner.parent.clone()
    }
}

fn thread_arguments(thread_id: i64) -> Value {
    serde_json::to_value(ThreadControlArguments { thread_id }).unwrap_or_default()
}

fn source_name(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn decode_body<T: DeserializeOwned>(
    command: &str,
    body: Option<Value>,
) -> Result<T, ClientError> {
    let value = body.unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|err| ClientError::MalformedResponse {
        command: command.to_string(),
        error: err.to_string(),
    })
}

/// Maps transport events into client events and services reverse
/// requests. One relay task runs per transport.
///
/// Returns a boxed future rather than being declared `async fn`: this
/// function and `fanout::handle_start_debugging` call each other
/// (directly and via `tokio::spawn`), and the recursive opaque
/// `impl Future` types that `async fn` would generate for that cycle
/// are rejected by the compiler ("fetching the hidden types of an
/// opaque inside of the defining scope is not supported"). Boxing
/// gives the future a concrete type and breaks the cycle.
pub(crate) fn relay_loop(
    inner: Arc<ClientInner>,
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    role: TransportRole,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Event { name, body } => relay_adapter_event(&inner, role, name, body),
                TransportEvent::ReverseRequest { seq, command, arguments } => {
                    handle_reverse_request(&inner, role, seq, command, arguments).await;
                }
                TransportEvent::ParseError { error } => {
                    let _ = inner.events_tx.send(ClientEvent::Error {
                        message: format!("protocol parse error: {error}"),
                    });
                }
                TransportEvent::Stderr { line } => {
                    let _ = inner.events_tx.send(ClientEvent::Stderr { line });
                }
                TransportEvent::ProcessExited { code } => {
                    let _ = inner.events_tx.send(ClientEvent::ProcessExited { code });
                }
                TransportEvent::Closed => {
                    match role {
                        TransportRole::Parent => {
                            let _ = inner.events_tx.send(ClientEvent::TransportClosed);
                        }
                        TransportRole::Child => debug!("child transport closed"),
                    }
                    break;
                }
            }
        }
    })
}

fn relay_adapter_event(
    inner: &Arc<ClientInner>,
    role: TransportRole,
    name: String,
    body: Option<Value>,
) {
    let event = match name.as_str() {
        "initialized" => {
            match role {
                TransportRole::Parent => {
                    inner.initialized.store(true, Ordering::SeqCst);
                    inner.initialized_notify.notify_waiters();
                    Some(ClientEvent::Initialized)
                }
                TransportRole::Child => {
                    inner.child_initialized.store(true, Ordering::SeqCst);
                    inner.child_init_notify.notify_waiters();
                    // The session already configured; child bootstrap
                    // handles its own configuration replay.
                    None
                }
            }
        }
        "stopped" => decode_event_body::<StoppedEventBody>(&name, body).map(ClientEvent::Stopped),
        "terminated" => Some(ClientEvent::Terminated),
        "exited" => decode_event_body::<ExitedEventBody>(&name, body)
            .map(|b| ClientEvent::Exited { exit_code: b.exit_code }),
        "output" => decode_event_body::<OutputEventBody>(&name, body).map(|b| ClientEvent::Output {
            category: b.category.unwrap_or_else(|| "console".to_string()),
            output: b.output,
        }),
        "breakpoint" => decode_event_body::<BreakpointEventBody>(&name, body)
            .map(ClientEvent::BreakpointChanged),
        _ => Some(ClientEvent::Adapter { name: name.clone(), body }),
    };
    if let Some(event) = event {
        let _ = inner.events_tx.send(event);
    }
}

fn decode_event_body<T: DeserializeOwned>(name: &str, body: Option<Value>) -> Option<T> {
    match serde_json::from_value(body.unwrap_or(Value::Null)) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!("dropping malformed '{name}' event: {err}");
            None
        }
    }
}

async fn handle_reverse_request(
    inner: &Arc<ClientInner>,
    role: TransportRole,
    seq: i64,
    command: String,
    arguments: Option<Value>,
) {
    let transport = match role {
        TransportRole::Parent => inner.parent.clone(),
        TransportRole::Child => match inner.child.read().await.as_ref() {
            Some(child) => child.clone(),
            None => inner.parent.clone(),
        },
    };
    match command.as_str() {
        "handshake" => answer_handshake(&transport, seq, arguments).await,
        "startDebugging" => {
            // Child bootstrap runs concurrently so this relay keeps
            // draining parent events during the fan-out.
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                crate::fanout::handle_start_debugging(inner, seq, arguments).await;
            });
        }
        other => {
            debug!("rejecting unsupported reverse request '{other}'");
            let _ = transport
                .send_response(
                    seq,
                    other,
                    false,
                    None,
                    Some(format!("unsupported reverse request: {other}")),
                )
                .await;
        }
    }
}

// ============================================================================
// Seam trait implementations
// ============================================================================

#[async_trait]
impl VariableSource for DapClient {
    async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, SourceError> {
        DapClient::scopes(self, frame_id).await.map_err(|err| SourceError(err.to_string()))
    }

    async fn variables(
        &self,
        variables_reference: i64,
        count: Option<i64>,
    ) -> Result<Vec<ProtocolVariable>, SourceError> {
        DapClient::variables(self, variables_reference, count)
            .await
            .map_err(|err| SourceError(err.to_string()))
    }

    async fn evaluate(
        &self,
        expression: &str,
        frame_id: i64,
        context: &str,
    ) -> Result<EvaluateResponseBody, SourceError> {
        DapClient::evaluate(self, expression, Some(frame_id), context)
            .await
            .map_err(|err| SourceError(err.to_string()))
    }
}

#[async_trait]
impl BreakpointTarget for DapClient {
    async fn set_breakpoints(
        &self,
        source_path: &str,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>, TargetError> {
        DapClient::set_breakpoints(self, source_path, breakpoints)
            .await
            .map_err(|err| TargetError(err.to_string()))
    }
}
