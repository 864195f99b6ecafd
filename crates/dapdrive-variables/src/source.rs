//! The seam between the inspector and whatever issues DAP requests.

use async_trait::async_trait;
use dapdrive_protocol::{EvaluateResponseBody, ProtocolVariable, Scope};
use thiserror::Error;

/// A request against the adapter failed. The inspector treats these as
/// per-item failures and keeps going with what it has.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

/// Adapter operations the inspector needs. Implemented by the DAP client;
/// tests substitute scripted object graphs.
#[async_trait]
pub trait VariableSource: Send + Sync {
    /// Fetches the scopes of a stack frame.
    async fn scopes(&self, frame_id: i64) -> Result<Vec<Scope>, SourceError>;

    /// Fetches up to `count` children of a reference handle.
    async fn variables(
        &self,
        variables_reference: i64,
        count: Option<i64>,
    ) -> Result<Vec<ProtocolVariable>, SourceError>;

    /// Evaluates an expression in the context of a frame.
    async fn evaluate(
        &self,
        expression: &str,
        frame_id: i64,
        context: &str,
    ) -> Result<EvaluateResponseBody, SourceError>;
}
