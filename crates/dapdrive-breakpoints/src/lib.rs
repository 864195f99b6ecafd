//! Breakpoint specs and the installation registry.
//!
//! Users hand the driver breakpoints as `file:line` strings with optional
//! `#hit-count` and `?condition` suffixes, and logpoints as
//! `file:line=message`. [`BreakpointSpec`] parses and path-resolves them;
//! [`BreakpointRegistry`] groups them by source file and installs each
//! source's full list with a single `setBreakpoints` request, reconciling
//! the adapter's response into per-breakpoint ids and verification state.
//!
//! Installation never aborts a session: a failing source records all of
//! its breakpoints as unverified with the failure message attached.

mod registry;
mod spec;

pub use registry::{
    BreakpointRegistry, BreakpointTarget, InstallReport, RegisteredBreakpoint, TargetError,
};
pub use spec::{BreakpointSpec, PathContext, SpecParseError};
