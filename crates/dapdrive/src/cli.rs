//! Command-line surface and its mapping onto a session configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dapdrive_breakpoints::BreakpointSpec;
use dapdrive_client::TransportKind;
use dapdrive_session::{SessionConfig, TraceConfig};
use dapdrive_variables::InspectorConfig;

use crate::profiles;

/// Headless Debug Adapter Protocol driver.
///
/// Drives a debug adapter through a full session against a target program
/// and reports stops, variables, evaluations and traces as one JSON event
/// per line on stdout.
#[derive(Parser, Debug)]
#[command(name = "dapdrive", version, about, long_about = None)]
pub struct Args {
    /// Debug adapter to use (coreclr, netcoredbg, python, node, go).
    #[arg(long)]
    pub adapter: String,

    /// Program to launch.
    #[arg(long, conflicts_with = "pid")]
    pub program: Option<PathBuf>,

    /// Process id to attach to.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Arguments passed to the launched program (after `--`).
    #[arg(last = true)]
    pub program_args: Vec<String>,

    /// Working directory for the debuggee and breakpoint resolution.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Environment overlay for the debuggee, KEY=VALUE, repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Breakpoint spec `file:line[#hit][?condition]`, repeatable.
    #[arg(long = "break", short = 'b', value_name = "SPEC")]
    pub breakpoints: Vec<String>,

    /// Logpoint spec `file:line=message`, repeatable.
    #[arg(long = "logpoint", value_name = "SPEC")]
    pub logpoints: Vec<String>,

    /// Exception filter tag understood by the adapter, repeatable.
    #[arg(long = "exception-filter", value_name = "TAG")]
    pub exception_filters: Vec<String>,

    /// Expression evaluated at each stop, repeatable.
    #[arg(long = "eval", value_name = "EXPR")]
    pub evaluations: Vec<String>,

    /// Invariant checked at each stop; a non-truthy result ends the
    /// session. Repeatable.
    #[arg(long = "assert", value_name = "EXPR")]
    pub assertions: Vec<String>,

    /// Global session timeout in seconds.
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,

    /// Do not fetch locals at stops.
    #[arg(long)]
    pub no_locals: bool,

    /// Number of steps to execute after each breakpoint.
    #[arg(long, value_name = "N")]
    pub steps: Option<u32>,

    /// Enter trace mode at each breakpoint.
    #[arg(long)]
    pub trace: bool,

    /// Trace with stepIn instead of next.
    #[arg(long, requires = "trace")]
    pub trace_into: bool,

    /// Trace step cap.
    #[arg(long, default_value_t = 500, requires = "trace")]
    pub trace_limit: usize,

    /// End the trace once this expression evaluates truthy.
    #[arg(long, value_name = "EXPR", requires = "trace")]
    pub trace_until: Option<String>,

    /// Report per-step variable changes while tracing.
    #[arg(long, requires = "trace")]
    pub trace_diff_vars: bool,

    /// Step once before evaluating; the breakpoint event reports the
    /// original location with post-step evaluations.
    #[arg(long)]
    pub eval_after_step: bool,

    /// Maximum variable expansion depth.
    #[arg(long, default_value_t = 2)]
    pub var_depth: u32,

    /// Maximum expanded items per collection.
    #[arg(long, default_value_t = 20)]
    pub var_items: usize,

    /// Keep duplicate object content instead of `[see: ...]` references.
    #[arg(long)]
    pub no_dedup: bool,

    /// Expand service-like members instead of `{Type}` compaction.
    #[arg(long)]
    pub no_compact_services: bool,

    /// Keep members whose value renders as null.
    #[arg(long)]
    pub keep_null_properties: bool,

    /// Emit only these event types (comma separated).
    #[arg(long = "events", value_delimiter = ',', value_name = "TYPES")]
    pub include_events: Vec<String>,

    /// Never emit these event types (comma separated).
    #[arg(long = "exclude-events", value_delimiter = ',', value_name = "TYPES")]
    pub exclude_events: Vec<String>,

    /// Override the adapter executable from the profile.
    #[arg(long, value_name = "PATH")]
    pub adapter_command: Option<String>,

    /// Override the socket port for socket-transport adapters.
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect to an already-running socket adapter instead of starting
    /// one.
    #[arg(long)]
    pub no_spawn: bool,

    /// Logging level for stderr diagnostics (error, warn, info, debug,
    /// trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Maps the parsed arguments onto an immutable session configuration.
    ///
    /// # Errors
    ///
    /// Fails on an unknown adapter id, malformed breakpoint/logpoint or
    /// environment specs, or a missing program/PID; these are usage
    /// errors and exit with status 2.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut profile = profiles::find_profile(&self.adapter).with_context(|| {
            format!(
                "unknown adapter '{}' (expected one of: {})",
                self.adapter,
                profiles::profile_ids().join(", ")
            )
        })?;

        if let Some(command) = &self.adapter_command {
            profile.command = Some(command.clone());
        }
        if self.no_spawn {
            if !profile.is_socket() {
                bail!("--no-spawn only applies to socket-transport adapters");
            }
            profile.command = None;
        }
        if let Some(port) = self.port {
            match &mut profile.transport {
                TransportKind::ClientSocket { port: profile_port, .. } => *profile_port = port,
                TransportKind::ChildProcessStdio => {
                    bail!("--port only applies to socket-transport adapters")
                }
            }
        }

        let mut breakpoints = Vec::new();
        for spec in &self.breakpoints {
            breakpoints.push(
                BreakpointSpec::parse(spec)
                    .with_context(|| format!("invalid breakpoint spec '{spec}'"))?,
            );
        }
        for spec in &self.logpoints {
            breakpoints.push(
                BreakpointSpec::parse_logpoint(spec)
                    .with_context(|| format!("invalid logpoint spec '{spec}'"))?,
            );
        }

        let mut env = HashMap::new();
        for entry in &self.env {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("invalid environment entry '{entry}' (want KEY=VALUE)"))?;
            env.insert(key.to_string(), value.to_string());
        }

        let mut config = SessionConfig::new(profile);
        config.program = self.program.clone();
        config.pid = self.pid;
        config.program_args = self.program_args.clone();
        config.cwd = self.cwd.clone();
        config.env = env;
        config.breakpoints = breakpoints;
        config.exception_filters = self.exception_filters.clone();
        config.evaluations = self.evaluations.clone();
        config.assertions = self.assertions.clone();
        config.timeout = Duration::from_secs(self.timeout);
        config.request_timeout = Duration::from_secs(self.request_timeout);
        config.capture_locals = !self.no_locals;
        config.steps = self.steps;
        config.eval_after_step = self.eval_after_step;
        config.inspector = InspectorConfig {
            max_depth: self.var_depth,
            max_collection_items: self.var_items,
            deduplicate_by_content: !self.no_dedup,
            compact_services: !self.no_compact_services,
            omit_null_properties: !self.keep_null_properties,
        };
        if self.trace {
            config.trace = Some(TraceConfig {
                step_into: self.trace_into,
                limit: self.trace_limit,
                until: self.trace_until.clone(),
                diff_vars: self.trace_diff_vars,
            });
        }
        config.validate().map_err(|err| anyhow::anyhow!(err.to_string()))?;
        Ok(config)
    }
}
