//! The NDJSON output sink.
//!
//! The core emits typed events; this sink serializes each one as a single
//! JSON object per line. stdout carries only this stream; diagnostics go
//! to stderr through `tracing`.

use std::collections::HashSet;
use std::io::Write;

use dapdrive_session::{Emitted, EventFilter, EventSink};
use tracing::warn;

/// One JSON object per line over any writer.
pub struct NdjsonSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> NdjsonSink<W> {
    /// Wraps a writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> EventSink for NdjsonSink<W> {
    fn emit(&mut self, event: &Emitted) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to serialize event: {err}");
                return;
            }
        };
        if writeln!(self.writer, "{line}").is_err() {
            return;
        }
        // Each line must be visible as soon as it happens; orchestration
        // software reads the stream live.
        let _ = self.writer.flush();
    }
}

/// Builds the event filter from the CLI's include/exclude lists.
pub fn build_filter(include: &[String], exclude: &[String]) -> EventFilter {
    let include = if include.is_empty() {
        None
    } else {
        Some(include.iter().cloned().collect::<HashSet<_>>())
    };
    let exclude = exclude.iter().cloned().collect();
    EventFilter::new(include, exclude)
}
