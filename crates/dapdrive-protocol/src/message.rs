//! The DAP message envelope.
//!
//! Every framed payload is one of `request`, `response` or `event`, carrying
//! a monotonically increasing `seq`. Responses additionally carry the
//! `request_seq` of the request they answer, a `success` flag and an
//! optional error `message`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single DAP message, discriminated by the wire-level `type` field.
///
/// Command arguments and bodies stay as raw [`Value`]s at this layer; the
/// typed structures in [`crate::types`] are applied by the caller once the
/// command is known. Requests flow in both directions: outbound requests
/// are the driver's own, inbound requests are reverse requests from the
/// adapter (`handshake`, `startDebugging`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProtocolMessage {
    /// A request, either outbound (driver to adapter) or reverse.
    #[serde(rename = "request")]
    Request {
        /// Sequence number, unique per sender.
        seq: i64,
        /// Command name (e.g. `initialize`, `setBreakpoints`).
        command: String,
        /// Command-specific arguments.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
    },
    /// A response to a request.
    #[serde(rename = "response")]
    Response {
        /// Sequence number of this message.
        seq: i64,
        /// Sequence number of the request being answered.
        request_seq: i64,
        /// Whether the request succeeded.
        success: bool,
        /// Command name of the request being answered.
        command: String,
        /// Error message when `success` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Command-specific response body.
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    /// An adapter notification.
    #[serde(rename = "event")]
    Event {
        /// Sequence number of this message.
        seq: i64,
        /// Event name (e.g. `stopped`, `terminated`).
        event: String,
        /// Event-specific body.
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

impl ProtocolMessage {
    /// The sequence number carried by any message kind.
    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Request { seq, .. }
            | ProtocolMessage::Response { seq, .. }
            | ProtocolMessage::Event { seq, .. } => *seq,
        }
    }
}
