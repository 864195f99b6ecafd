//! Breakpoint spec strings and path resolution.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

/// A malformed breakpoint spec string.
#[derive(Debug, Error, PartialEq)]
pub enum SpecParseError {
    /// No `:line` part could be found.
    #[error("breakpoint spec '{0}' has no ':line' part")]
    MissingLine(String),
    /// The line part was not a positive number.
    #[error("breakpoint spec '{0}' has an invalid line number")]
    InvalidLine(String),
    /// A logpoint spec without a message.
    #[error("logpoint spec '{0}' has no '=message' part")]
    MissingMessage(String),
}

/// Where relative breakpoint paths are anchored, in priority order:
/// explicit working directory, the program's directory, the process cwd.
#[derive(Debug, Clone, Default)]
pub struct PathContext {
    /// Explicit working directory from the session configuration.
    pub cwd: Option<PathBuf>,
    /// Directory of the target program.
    pub program_dir: Option<PathBuf>,
}

/// A user-supplied breakpoint before installation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointSpec {
    /// Source path as resolved for the adapter.
    pub file: String,
    /// Line number, 1-based.
    pub line: i64,
    /// Optional condition expression (`?expr` suffix).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Optional hit condition (`#N` suffix).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    /// Logpoint message; present makes this a logpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl BreakpointSpec {
    /// Parses `file:line`, `file:line#N`, `file:line?expr` or
    /// `file:line#N?expr`. The colon is searched from the right so
    /// Windows drive letters survive.
    pub fn parse(spec: &str) -> Result<Self, SpecParseError> {
        let (file, rest) = split_on_line_colon(spec)
            .ok_or_else(|| SpecParseError::MissingLine(spec.to_string()))?;

        // rest is "<digits>[#N][?expr]"
        let (line_and_hit, condition) = match rest.split_once('?') {
            Some((left, cond)) if !cond.is_empty() => (left, Some(cond.to_string())),
            Some((left, _)) => (left, None),
            None => (rest, None),
        };
        let (line_text, hit_condition) = match line_and_hit.split_once('#') {
            Some((left, hit)) if !hit.is_empty() => (left, Some(hit.to_string())),
            Some((left, _)) => (left, None),
            None => (line_and_hit, None),
        };
        let line = parse_line(line_text, spec)?;

        Ok(Self { file: file.to_string(), line, condition, hit_condition, log_message: None })
    }

    /// Parses a logpoint spec `file:line=message`.
    pub fn parse_logpoint(spec: &str) -> Result<Self, SpecParseError> {
        let (file, rest) = split_on_line_colon(spec)
            .ok_or_else(|| SpecParseError::MissingLine(spec.to_string()))?;
        let (line_text, message) = rest
            .split_once('=')
            .filter(|(_, message)| !message.is_empty())
            .ok_or_else(|| SpecParseError::MissingMessage(spec.to_string()))?;
        let line = parse_line(line_text, spec)?;

        Ok(Self {
            file: file.to_string(),
            line,
            condition: None,
            hit_condition: None,
            log_message: Some(message.to_string()),
        })
    }

    /// Whether this spec is a logpoint.
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }

    /// Resolves a relative file against the path context. The first
    /// anchor that produces an existing file wins; otherwise the highest
    /// priority anchor is used as-is.
    pub fn resolve_path(&mut self, context: &PathContext) {
        if Path::new(&self.file).is_absolute() {
            return;
        }
        let mut anchors: Vec<PathBuf> = Vec::new();
        if let Some(cwd) = &context.cwd {
            anchors.push(cwd.clone());
        }
        if let Some(program_dir) = &context.program_dir {
            anchors.push(program_dir.clone());
        }
        if let Ok(process_cwd) = std::env::current_dir() {
            anchors.push(process_cwd);
        }

        for anchor in &anchors {
            let candidate = anchor.join(&self.file);
            if candidate.exists() {
                self.file = candidate.to_string_lossy().into_owned();
                return;
            }
        }
        if let Some(first) = anchors.first() {
            self.file = first.join(&self.file).to_string_lossy().into_owned();
        }
    }
}

/// Splits `spec` at the rightmost colon whose right-hand side starts with
/// a digit, returning (file, rest).
fn split_on_line_colon(spec: &str) -> Option<(&str, &str)> {
    for (index, _) in spec.char_indices().filter(|(_, c)| *c == ':').collect::<Vec<_>>().into_iter().rev()
    {
        let (file, rest) = (&spec[..index], &spec[index + 1..]);
        if !file.is_empty() && rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Some((file, rest));
        }
    }
    None
}

fn parse_line(text: &str, spec: &str) -> Result<i64, SpecParseError> {
    let line: i64 =
        text.parse().map_err(|_| SpecParseError::InvalidLine(spec.to_string()))?;
    if line < 1 {
        return Err(SpecParseError::InvalidLine(spec.to_string()));
    }
    Ok(line)
}
