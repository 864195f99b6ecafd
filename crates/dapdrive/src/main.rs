//! dapdrive entry point.
//!
//! stdout carries the NDJSON event stream and nothing else; diagnostics
//! go to stderr via `tracing`.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use dapdrive::cli::Args;
use dapdrive::output::{build_filter, NdjsonSink};
use dapdrive::{exit_code_for, profiles};
use dapdrive_session::SessionManager;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match args.session_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("dapdrive: {err:#}");
            eprintln!("dapdrive: known adapters: {}", profiles::profile_ids().join(", "));
            return ExitCode::from(2);
        }
    };

    tracing::info!(
        "starting debug session: adapter={} target={}",
        config.profile.id,
        config
            .program
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| config.pid.map(|pid| format!("pid {pid}")))
            .unwrap_or_default()
    );

    let sink = NdjsonSink::new(io::stdout());
    let filter = build_filter(&args.include_events, &args.exclude_events);
    let result = SessionManager::new(config, Box::new(sink), filter).run().await;

    if let Some(err) = &result.error {
        tracing::error!("session failed: {err}");
    } else {
        tracing::info!(
            "session complete: {} breakpoint hits, {} exceptions, {} steps",
            result.summary.breakpoints_hit,
            result.summary.exceptions_caught,
            result.summary.steps_executed
        );
    }
    ExitCode::from(exit_code_for(result.error.as_ref()))
}
