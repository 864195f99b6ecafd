//! Child-session fan-out for multiplexing adapters.
//!
//! Supervisor adapters run user code in a worker session: after the
//! parent `launch`, the adapter issues a reverse `startDebugging` request
//! carrying the child configuration (including its adapter-assigned
//! target id). The client opens a second transport to the same endpoint,
//! walks it through its own initialize/configure sequence, replays the
//! breakpoints and exception filters that were installed on the parent,
//! and launches the child configuration. Debugging operations then route
//! to the child transport; the session layer never learns multiplexing
//! happened.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dapdrive_protocol::{
    InitializeRequestArguments, SetBreakpointsArguments, SetExceptionBreakpointsArguments, Source,
    StartDebuggingRequestArguments,
};
use dapdrive_transport::Transport;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::{relay_loop, ClientInner, TransportRole};

/// Bounded wait for the child transport's `initialized` event.
const CHILD_INITIALIZED_TIMEOUT: Duration = Duration::from_secs(10);

/// Services one reverse `startDebugging` request end to end, answering
/// it once the child session is running (or failed).
pub(crate) async fn handle_start_debugging(
    inner: Arc<ClientInner>,
    request_seq: i64,
    arguments: Option<Value>,
) {
    let result = start_child_session(&inner, arguments).await;
    let (success, message) = match result {
        Ok(()) => (true, None),
        Err(message) => {
            warn!("startDebugging failed: {message}");
            (false, Some(message))
        }
    };
    if let Err(err) = inner
        .parent
        .send_response(request_seq, "startDebugging", success, None, message)
        .await
    {
        warn!("failed to answer startDebugging: {err}");
    }
}

async fn start_child_session(inner: &Arc<ClientInner>, arguments: Option<Value>) -> Result<(), String> {
    let arguments: StartDebuggingRequestArguments = serde_json::from_value(
        arguments.ok_or_else(|| "startDebugging carried no arguments".to_string())?,
    )
    .map_err(|err| format!("malformed startDebugging arguments: {err}"))?;

    let (host, port) = inner
        .profile
        .socket_endpoint()
        .ok_or_else(|| "adapter is not socket-based; cannot open a child session".to_string())?;

    info!("opening child debug session to {host}:{port} ({})", arguments.request);
    let (child, child_rx) =
        Transport::connect(host, port, inner.transport_config.clone())
            .await
            .map_err(|err| format!("child connect failed: {err}"))?;

    inner.child_initialized.store(false, Ordering::SeqCst);
    tokio::spawn(relay_loop(Arc::clone(inner), child_rx, TransportRole::Child));

    if let Err(err) = bootstrap_child(inner, &child, &arguments).await {
        child.close().await;
        return Err(err);
    }

    *inner.child.write().await = Some(child);
    Ok(())
}

/// initialize → await initialized → replay breakpoints and filters →
/// configurationDone → launch/attach the child configuration.
async fn bootstrap_child(
    inner: &Arc<ClientInner>,
    child: &Transport,
    arguments: &StartDebuggingRequestArguments,
) -> Result<(), String> {
    let initialize = InitializeRequestArguments {
        client_id: Some("dapdrive".to_string()),
        client_name: Some("dapdrive".to_string()),
        adapter_id: inner.profile.id.clone(),
        locale: Some("en-US".to_string()),
        lines_start_at1: Some(true),
        columns_start_at1: Some(true),
        path_format: Some("path".to_string()),
        supports_variable_type: Some(true),
        supports_variable_paging: Some(true),
        supports_run_in_terminal_request: Some(false),
        supports_start_debugging_request: Some(true),
    };
    child
        .send_request("initialize", Some(serde_json::to_value(&initialize).unwrap_or_default()))
        .await
        .map_err(|err| format!("child initialize failed: {err}"))?;

    wait_child_initialized(inner).await;

    let breakpoints = inner.last_breakpoints.read().await.clone();
    for (path, breakpoints) in breakpoints {
        let arguments = SetBreakpointsArguments {
            source: Source {
                path: Some(path.clone()),
                name: None,
                source_reference: None,
            },
            breakpoints: Some(breakpoints),
            source_modified: Some(false),
        };
        if let Err(err) = child
            .send_request(
                "setBreakpoints",
                Some(serde_json::to_value(&arguments).unwrap_or_default()),
            )
            .await
        {
            warn!("child setBreakpoints for {path} failed: {err}");
        }
    }

    let filters = inner.last_exception_filters.read().await.clone();
    if let Some(filters) = filters {
        let arguments = SetExceptionBreakpointsArguments { filters };
        if let Err(err) = child
            .send_request(
                "setExceptionBreakpoints",
                Some(serde_json::to_value(&arguments).unwrap_or_default()),
            )
            .await
        {
            warn!("child setExceptionBreakpoints failed: {err}");
        }
    }

    child
        .send_request("configurationDone", None)
        .await
        .map_err(|err| format!("child configurationDone failed: {err}"))?;

    // The child configuration carries the adapter-assigned target id.
    child
        .send_request(&arguments.request, Some(arguments.configuration.clone()))
        .await
        .map_err(|err| format!("child {} failed: {err}", arguments.request))?;

    Ok(())
}

async fn wait_child_initialized(inner: &Arc<ClientInner>) {
    let deadline = tokio::time::Instant::now() + CHILD_INITIALIZED_TIMEOUT;
    loop {
        if inner.child_initialized.load(Ordering::SeqCst) {
            return;
        }
        let notified = inner.child_init_notify.notified();
        if inner.child_initialized.load(Ordering::SeqCst) {
            return;
        }
        if tokio::time::timeout_at(deadline, notified).await.is_err() {
            warn!("child session did not send 'initialized' in time; proceeding");
            return;
        }
    }
}
