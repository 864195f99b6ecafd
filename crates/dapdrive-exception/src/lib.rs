//! Exception chain analysis for stopped frames.
//!
//! When a session stops on an exception, the adapter's captured locals
//! contain an `$exception` entry whose members mirror the thrown object.
//! The [`ExceptionAnalyzer`] walks its inner-exception chain, extracts a
//! small set of type-specific fields per level, marks the deepest entry as
//! the root cause, classifies it against a closed type table and attaches
//! an actionable hint drawn from fixed lookup tables. Hint text is never
//! synthesized.
//!
//! Everything here is best effort: a missing `$exception` yields no
//! analysis, a missing member yields a partial entry, and classification
//! falls back to `unknown`.

mod chain;
mod classify;

pub use chain::{ExceptionAnalyzer, ExceptionChainEntry};
pub use classify::{classify_type, hint_for, ExceptionCategory};

use serde::Serialize;

/// The analyzer's verdict on the deepest chain entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCause {
    /// Runtime type of the root-cause exception.
    #[serde(rename = "type")]
    pub exception_type: String,
    /// Classification category.
    pub category: ExceptionCategory,
    /// Actionable hint, when one of the fixed tables matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionable_hint: Option<String>,
}

/// The flattened chain plus root-cause classification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionAnalysis {
    /// Chain entries, outermost first. The deepest has `is_root_cause`.
    pub chain: Vec<ExceptionChainEntry>,
    /// Classification of the deepest entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<RootCause>,
}
