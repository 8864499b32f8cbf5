use thiserror::Error;

use veil_crypto::CryptoError;
use veil_proto::ProtocolError;

/// Errors surfaced by [`crate::Client`] operations.
///
/// Most wire-level oddities (stray messages, duplicate keys) are absorbed
/// silently or downgraded to log lines; errors here are the ones the caller
/// must react to, chiefly attempts to send over a channel that has no
/// usable key.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Attempted to send on a 1:1 session whose handshake has not completed.
    #[error("no session key established with {peer}")]
    ChannelInsecure {
        /// The peer the session was meant to cover.
        peer: String,
    },

    /// Attempted to send to a group whose key lags the current membership
    /// generation, or for which no key has arrived at all.
    #[error("group {group_id} has no key for the current generation")]
    GroupInsecure {
        /// The affected group.
        group_id: String,
    },

    /// Referenced a peer with no active or pending session.
    #[error("no session with {peer}")]
    UnknownPeer {
        /// The unknown peer.
        peer: String,
    },

    /// Referenced a group this client is not a member of.
    #[error("not a member of group {group_id}")]
    UnknownGroup {
        /// The unknown group.
        group_id: String,
    },

    /// A member attempted an owner-only action.
    #[error("{username} does not own group {group_id}")]
    NotGroupOwner {
        /// The local identity.
        username: String,
        /// The affected group.
        group_id: String,
    },

    /// Wire encoding or decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
