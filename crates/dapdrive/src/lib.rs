//! dapdrive: a headless Debug Adapter Protocol driver.
//!
//! The binary wires the session crate to the outside world: built-in
//! adapter profiles, command-line parsing, the NDJSON output sink and the
//! exit-code mapping. Everything protocol- and session-shaped lives in
//! the `dapdrive-*` library crates.

#![deny(unsafe_code)]

pub mod cli;
pub mod output;
pub mod profiles;

use dapdrive_session::SessionError;

/// Exit status for a finished session: 0 on success, 3 for an assertion
/// violation, 1 for any other stored session error. Usage errors exit
/// with 2 via clap before a session exists.
pub fn exit_code_for(error: Option<&SessionError>) -> u8 {
    match error {
        None => 0,
        Some(err) if err.is_assertion() => 3,
        Some(_) => 1,
    }
}
