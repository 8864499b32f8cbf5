//! Crypto payload envelope.
//!
//! Everything end-to-end encrypted travels inside an [`Envelope`]. The relay
//! forwards envelopes opaquely; only the clients at either end can interpret
//! box contents.

use serde::{Deserialize, Serialize};

/// An opaque crypto payload.
///
/// `SessionKey` and `GroupKey` carry a symmetric key sealed with public-key
/// authenticated encryption (sender secret key + recipient public key).
/// `EncryptedMessage` carries traffic sealed with symmetric authenticated
/// encryption under an established session or group key. Nonces are fresh
/// random 24-byte values, one per seal operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// A 1:1 session key sealed for the responder.
    SessionKey {
        /// Public-key authenticated ciphertext of the session key.
        #[serde(rename = "box", with = "crate::b64")]
        boxed: Vec<u8>,
        /// Nonce used for the seal.
        #[serde(with = "crate::b64")]
        nonce: Vec<u8>,
    },

    /// Symmetric authenticated ciphertext of a chat message.
    EncryptedMessage {
        /// Ciphertext including the authentication tag.
        #[serde(with = "crate::b64")]
        ciphertext: Vec<u8>,
        /// Nonce used for the seal.
        #[serde(with = "crate::b64")]
        nonce: Vec<u8>,
    },

    /// A group key sealed by the owner for one member.
    GroupKey {
        /// Public-key authenticated ciphertext of the group key.
        #[serde(rename = "box", with = "crate::b64")]
        boxed: Vec<u8>,
        /// Nonce used for the seal.
        #[serde(with = "crate::b64")]
        nonce: Vec<u8>,
    },
}
