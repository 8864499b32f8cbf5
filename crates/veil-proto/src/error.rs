//! Wire protocol errors.

use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
///
/// Decode failures are always local: the relay drops undecodable lines and
/// logs, it never surfaces them to peers.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Message could not be parsed as a known wire message.
    #[error("invalid wire message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Message could not be serialized.
    #[error("failed to encode wire message: {0}")]
    Encode(#[source] serde_json::Error),
}
