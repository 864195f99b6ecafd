//! Built-in adapter profiles.
//!
//! One declarative [`AdapterProfile`] per supported backend, covering the
//! three startup-ordering families: socket supervisors (js-debug, delve),
//! launch-first dynamic-language adapters (debugpy), and native-ordering
//! stdio adapters (vsdbg, netcoredbg).

use std::time::Duration;

use dapdrive_client::{AdapterProfile, AttachParams, LaunchParams, TransportKind};
use serde_json::{json, Value};

/// Default port for the js-debug DAP server.
const JS_DEBUG_PORT: u16 = 8123;

/// Default port for `dlv dap`.
const DELVE_PORT: u16 = 38697;

/// All built-in profiles.
pub fn builtin_profiles() -> Vec<AdapterProfile> {
    vec![coreclr(), netcoredbg(), python(), node(), go()]
}

/// Looks up a profile by its stable id.
pub fn find_profile(id: &str) -> Option<AdapterProfile> {
    builtin_profiles().into_iter().find(|profile| profile.id == id)
}

/// The ids accepted by `--adapter`, for help and error text.
pub fn profile_ids() -> Vec<&'static str> {
    vec!["coreclr", "netcoredbg", "python", "node", "go"]
}

/// vsdbg: stdio, signed handshake, native ordering.
fn coreclr() -> AdapterProfile {
    AdapterProfile {
        id: "coreclr".to_string(),
        name: ".NET Core Debugger (vsdbg)".to_string(),
        command: Some("vsdbg".to_string()),
        args: vec!["--interpreter=vscode".to_string()],
        transport: TransportKind::ChildProcessStdio,
        requires_launch_first: false,
        signed_handshake: true,
        exception_filters: vec!["all".to_string(), "user-unhandled".to_string()],
        launch_args: coreclr_launch,
        attach_args: pid_attach,
    }
}

fn coreclr_launch(params: &LaunchParams) -> Value {
    json!({
        "name": "dapdrive-launch",
        "type": "coreclr",
        "request": "launch",
        "program": params.program,
        "args": params.args,
        "cwd": params.cwd,
        "env": params.env,
        "stopAtEntry": params.stop_on_entry,
        "console": "internalConsole",
        "justMyCode": true
    })
}

/// netcoredbg: the open-source .NET adapter, same shape minus the
/// handshake.
fn netcoredbg() -> AdapterProfile {
    AdapterProfile {
        id: "netcoredbg".to_string(),
        name: ".NET Core Debugger (netcoredbg)".to_string(),
        command: Some("netcoredbg".to_string()),
        args: vec!["--interpreter=vscode".to_string()],
        transport: TransportKind::ChildProcessStdio,
        requires_launch_first: false,
        signed_handshake: false,
        exception_filters: vec!["all".to_string(), "user-unhandled".to_string()],
        launch_args: coreclr_launch,
        attach_args: pid_attach,
    }
}

/// debugpy: stdio, announces `initialized` only after launch/attach.
fn python() -> AdapterProfile {
    AdapterProfile {
        id: "python".to_string(),
        name: "Python (debugpy)".to_string(),
        command: Some("python3".to_string()),
        args: vec!["-m".to_string(), "debugpy.adapter".to_string()],
        transport: TransportKind::ChildProcessStdio,
        requires_launch_first: true,
        signed_handshake: false,
        exception_filters: vec![
            "raised".to_string(),
            "uncaught".to_string(),
            "userUnhandled".to_string(),
        ],
        launch_args: python_launch,
        attach_args: pid_attach,
    }
}

fn python_launch(params: &LaunchParams) -> Value {
    json!({
        "name": "dapdrive-launch",
        "type": "python",
        "request": "launch",
        "program": params.program,
        "args": params.args,
        "cwd": params.cwd,
        "env": params.env,
        "stopOnEntry": params.stop_on_entry,
        "console": "internalConsole",
        "justMyCode": true,
        "redirectOutput": true
    })
}

/// js-debug: a socket supervisor that spawns worker sessions through
/// reverse `startDebugging` requests.
fn node() -> AdapterProfile {
    AdapterProfile {
        id: "node".to_string(),
        name: "Node.js (js-debug)".to_string(),
        command: Some("js-debug".to_string()),
        args: vec![JS_DEBUG_PORT.to_string()],
        transport: TransportKind::ClientSocket {
            host: "127.0.0.1".to_string(),
            port: JS_DEBUG_PORT,
            connect_delay: Duration::from_millis(500),
        },
        requires_launch_first: false,
        signed_handshake: false,
        exception_filters: vec!["all".to_string(), "uncaught".to_string()],
        launch_args: node_launch,
        attach_args: pid_attach,
    }
}

fn node_launch(params: &LaunchParams) -> Value {
    json!({
        "name": "dapdrive-launch",
        "type": "pwa-node",
        "request": "launch",
        "program": params.program,
        "args": params.args,
        "cwd": params.cwd,
        "env": params.env,
        "stopOnEntry": params.stop_on_entry,
        "console": "internalConsole",
        "outputCapture": "std"
    })
}

/// delve in DAP mode: a socket server with native ordering.
fn go() -> AdapterProfile {
    AdapterProfile {
        id: "go".to_string(),
        name: "Go (delve)".to_string(),
        command: Some("dlv".to_string()),
        args: vec![
            "dap".to_string(),
            "--listen".to_string(),
            format!("127.0.0.1:{DELVE_PORT}"),
        ],
        transport: TransportKind::ClientSocket {
            host: "127.0.0.1".to_string(),
            port: DELVE_PORT,
            connect_delay: Duration::from_millis(300),
        },
        requires_launch_first: false,
        signed_handshake: false,
        exception_filters: vec![],
        launch_args: go_launch,
        attach_args: go_attach,
    }
}

fn go_launch(params: &LaunchParams) -> Value {
    json!({
        "name": "dapdrive-launch",
        "request": "launch",
        "mode": "exec",
        "program": params.program,
        "args": params.args,
        "cwd": params.cwd,
        "env": params.env,
        "stopOnEntry": params.stop_on_entry
    })
}

fn go_attach(params: &AttachParams) -> Value {
    json!({
        "name": "dapdrive-attach",
        "request": "attach",
        "mode": "local",
        "processId": params.pid
    })
}

/// The common attach shape: just a process id.
fn pid_attach(params: &AttachParams) -> Value {
    json!({
        "name": "dapdrive-attach",
        "request": "attach",
        "processId": params.pid
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_advertised_id_resolves() {
        for id in profile_ids() {
            let profile = find_profile(id).unwrap_or_else(|| panic!("missing profile {id}"));
            assert_eq!(profile.id, id);
        }
        assert!(find_profile("cobol").is_none());
    }

    #[test]
    fn test_family_flags() {
        assert!(find_profile("coreclr").unwrap().signed_handshake);
        assert!(find_profile("python").unwrap().requires_launch_first);
        assert!(find_profile("node").unwrap().is_socket());
        assert!(!find_profile("netcoredbg").unwrap().is_socket());
    }

    #[test]
    fn test_launch_builders_embed_program() {
        let params = LaunchParams {
            program: "/app/bin/app".to_string(),
            args: vec!["--fast".to_string()],
            cwd: Some("/app".to_string()),
            env: Default::default(),
            stop_on_entry: false,
        };
        for id in profile_ids() {
            let profile = find_profile(id).unwrap();
            let value = (profile.launch_args)(&params);
            assert_eq!(value["program"], "/app/bin/app", "profile {id}");
            assert_eq!(value["args"][0], "--fast", "profile {id}");
        }
    }

    #[test]
    fn test_attach_builders_embed_pid() {
        let params = AttachParams { pid: 4242 };
        for id in profile_ids() {
            let profile = find_profile(id).unwrap();
            let value = (profile.attach_args)(&params);
            assert_eq!(value["processId"], 4242, "profile {id}");
        }
    }
}
