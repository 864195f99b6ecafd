//! Variable inspection for stopped frames.
//!
//! The [`VariableInspector`] owns the policy for how far to expand a
//! frame's variables, which names and types to elide, how cycles are cut
//! and how repeated content is deduplicated. It talks to the adapter
//! through the [`VariableSource`] seam so the expansion logic is testable
//! against scripted object graphs.
//!
//! Expansion is bounded three ways:
//!
//! - **depth**: no rendered path is deeper than `max_depth` member levels;
//! - **cycles**: a reference handle seen earlier in the same snapshot
//!   short-circuits with `cyclic = true`;
//! - **duplicates**: the second object whose immediate projection hashes
//!   identically to an earlier one is replaced by a `[see: <path>]`
//!   reference.
//!
//! The visited set and content-hash map are per snapshot; nothing is
//! shared across stops.

mod diff;
mod inspector;
mod source;
mod value;

pub use diff::{diff_locals, ChangeKind, VariableChange};
pub use inspector::{EvaluationResult, InspectorConfig, VariableInspector};
pub use source::{SourceError, VariableSource};
pub use value::{CollectionValue, Primitive, RenderedValue, VariableValue};

/// A frame snapshot: locals by name, in adapter order.
pub type LocalsSnapshot = indexmap::IndexMap<String, VariableValue>;
