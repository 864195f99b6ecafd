//! The per-source breakpoint registry and installation protocol.

use async_trait::async_trait;
use dapdrive_protocol::{Breakpoint, SourceBreakpoint};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::spec::BreakpointSpec;

/// A `setBreakpoints` request against one source failed.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TargetError(pub String);

/// The installation seam. Implemented by the DAP client; tests script the
/// adapter's replies.
#[async_trait]
pub trait BreakpointTarget: Send + Sync {
    /// Replaces the full breakpoint list of one source.
    async fn set_breakpoints(
        &self,
        source_path: &str,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<Breakpoint>, TargetError>;
}

/// One breakpoint with its installation state.
#[derive(Debug, Clone)]
pub struct RegisteredBreakpoint {
    /// The originating spec.
    pub spec: BreakpointSpec,
    /// Adapter-assigned id, or a synthesized one when the adapter omits it.
    pub id: Option<i64>,
    /// Whether the adapter verified the breakpoint.
    pub verified: bool,
    /// The line the adapter actually bound, initially the requested line.
    pub actual_line: i64,
    /// Adapter or failure message.
    pub message: Option<String>,
}

impl RegisteredBreakpoint {
    fn new(spec: BreakpointSpec) -> Self {
        let actual_line = spec.line;
        Self { spec, id: None, verified: false, actual_line, message: None }
    }
}

/// Flat view of one installed breakpoint, emitted as a `breakpoint_set`
/// event by the session.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Breakpoint id.
    pub id: i64,
    /// Source path.
    pub file: String,
    /// Bound line.
    pub line: i64,
    /// Verification state.
    pub verified: bool,
    /// Condition, when the spec carried one.
    pub condition: Option<String>,
    /// Adapter or failure message.
    pub message: Option<String>,
}

/// Breakpoints grouped by source path, installed source-by-source with
/// whole-list replace semantics.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    sources: IndexMap<String, Vec<RegisteredBreakpoint>>,
    next_synthetic_id: i64,
}

impl BreakpointRegistry {
    /// Builds the registry from parsed specs, grouping by source path and
    /// preserving the user's order within each source.
    pub fn new(specs: impl IntoIterator<Item = BreakpointSpec>) -> Self {
        let mut sources: IndexMap<String, Vec<RegisteredBreakpoint>> = IndexMap::new();
        for spec in specs {
            sources.entry(spec.file.clone()).or_default().push(RegisteredBreakpoint::new(spec));
        }
        Self { sources, next_synthetic_id: 1 }
    }

    /// Whether any breakpoints are registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The registered breakpoints, per source.
    pub fn sources(&self) -> &IndexMap<String, Vec<RegisteredBreakpoint>> {
        &self.sources
    }

    /// Finds a breakpoint by its installed id.
    pub fn find_by_id(&self, id: i64) -> Option<&RegisteredBreakpoint> {
        self.sources.values().flatten().find(|bp| bp.id == Some(id))
    }

    /// Whether the given installed id belongs to a logpoint.
    pub fn is_logpoint(&self, id: i64) -> bool {
        self.find_by_id(id).is_some_and(|bp| bp.spec.is_logpoint())
    }

    /// Applies an adapter-side `breakpoint` event to the matching entry.
    pub fn apply_adapter_update(&mut self, update: &Breakpoint) {
        let Some(id) = update.id else {
            return;
        };
        for breakpoints in self.sources.values_mut() {
            if let Some(entry) = breakpoints.iter_mut().find(|bp| bp.id == Some(id)) {
                entry.verified = update.verified;
                if let Some(line) = update.line {
                    entry.actual_line = line;
                }
                if update.message.is_some() {
                    entry.message = update.message.clone();
                }
                return;
            }
        }
        debug!("breakpoint event for unknown id {id}");
    }

    /// Installs every source's breakpoint list on the target: exactly one
    /// `setBreakpoints` per source carrying the full list. The adapter's
    /// reply replaces the per-source state atomically; a failing source
    /// records all of its entries as unverified with the error message.
    ///
    /// Returns one report per breakpoint, in registration order.
    pub async fn install_all<T>(&mut self, target: &T) -> Vec<InstallReport>
    where
        T: BreakpointTarget + ?Sized,
    {
        let Self { sources, next_synthetic_id } = self;
        let mut reports = Vec::new();
        for (path, breakpoints) in sources.iter_mut() {
            let request: Vec<SourceBreakpoint> = breakpoints
                .iter()
                .map(|bp| SourceBreakpoint {
                    line: bp.spec.line,
                    column: None,
                    condition: bp.spec.condition.clone(),
                    hit_condition: bp.spec.hit_condition.clone(),
                    log_message: bp.spec.log_message.clone(),
                })
                .collect();

            match target.set_breakpoints(path, request).await {
                Ok(reply) => {
                    for (index, entry) in breakpoints.iter_mut().enumerate() {
                        let response = reply.get(index);
                        entry.id = response.and_then(|r| r.id);
                        if entry.id.is_none() {
                            entry.id = Some(*next_synthetic_id);
                            *next_synthetic_id += 1;
                        }
                        entry.verified = response.is_some_and(|r| r.verified);
                        entry.actual_line =
                            response.and_then(|r| r.line).unwrap_or(entry.spec.line);
                        entry.message = response.and_then(|r| r.message.clone());
                    }
                }
                Err(err) => {
                    warn!("setBreakpoints failed for {path}: {err}");
                    for entry in breakpoints.iter_mut() {
                        if entry.id.is_none() {
                            entry.id = Some(*next_synthetic_id);
                            *next_synthetic_id += 1;
                        }
                        entry.verified = false;
                        entry.actual_line = entry.spec.line;
                        entry.message = Some(err.to_string());
                    }
                }
            }

            reports.extend(breakpoints.iter().map(|entry| InstallReport {
                id: entry.id.unwrap_or_default(),
                file: path.clone(),
                line: entry.actual_line,
                verified: entry.verified,
                condition: entry.spec.condition.clone(),
                message: entry.message.clone(),
            }));
        }
        reports
    }
}
