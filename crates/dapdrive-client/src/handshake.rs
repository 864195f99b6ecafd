//! The signed handshake reverse request.
//!
//! Signed adapters challenge the client before they will proceed. The
//! signature comes from the debugger toolchain's native signing module;
//! we look for it in a fixed set of installation locations and treat it
//! as an optional capability: no signer means an empty signature, and an
//! adapter that rejects that surfaces as a normal protocol error on the
//! next request.

use std::path::PathBuf;

use dapdrive_protocol::{HandshakeRequestArguments, HandshakeResponseBody};
use dapdrive_transport::Transport;
use serde_json::Value;
use tracing::{debug, warn};

/// Environment override for the signer location, checked first.
const SIGNER_ENV: &str = "DAPDRIVE_HANDSHAKE_SIGNER";

/// Well-known signer installation paths, relative to the home directory
/// or absolute.
const SIGNER_LOCATIONS: &[&str] = &[
    "~/.vsdbg/vsdbg-signer",
    "~/.vs-debugger/vsdbg-signer",
    "/usr/local/share/vsdbg/vsdbg-signer",
    "/usr/share/vsdbg/vsdbg-signer",
];

/// Answers a reverse `handshake` request on the given transport.
pub(crate) async fn answer_handshake(transport: &Transport, seq: i64, arguments: Option<Value>) {
    let challenge = arguments
        .and_then(|value| serde_json::from_value::<HandshakeRequestArguments>(value).ok())
        .map(|args| args.value)
        .unwrap_or_default();

    let signature = sign_challenge(&challenge).await.unwrap_or_default();
    if signature.is_empty() {
        debug!("no handshake signer available; answering with empty signature");
    }

    let body = serde_json::to_value(HandshakeResponseBody { signature }).unwrap_or_default();
    if let Err(err) = transport.send_response(seq, "handshake", true, Some(body), None).await {
        warn!("failed to answer handshake: {err}");
    }
}

/// Runs the platform signer over the challenge, returning `None` when no
/// signer is installed or it fails.
async fn sign_challenge(challenge: &str) -> Option<String> {
    let signer = find_signer()?;
    let output = tokio::process::Command::new(&signer)
        .arg("--sign")
        .arg(challenge)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        warn!("handshake signer {} exited with {:?}", signer.display(), output.status.code());
        return None;
    }
    let signature = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!signature.is_empty()).then_some(signature)
}

/// Locates the signer binary: environment override first, then the fixed
/// installation paths.
fn find_signer() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(SIGNER_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }
    let home = std::env::var_os("HOME").map(PathBuf::from);
    for location in SIGNER_LOCATIONS {
        let path = match location.strip_prefix("~/") {
            Some(rest) => match home.as_ref() {
                Some(home) => home.join(rest),
                None => continue,
            },
            None => PathBuf::from(location),
        };
        if path.is_file() {
            return Some(path);
        }
    }
    None
}
