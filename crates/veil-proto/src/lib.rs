//! Veil wire protocol.
//!
//! JSON-encoded protocol messages exchanged through the relay. Every message
//! is a tagged union: the `type` field selects the variant, remaining fields
//! are camelCase. Byte fields (public keys, boxes, ciphertexts, nonces) are
//! base64 strings on the wire.
//!
//! The relay never inspects [`Envelope`] contents beyond routing metadata:
//! ciphertexts and nonces pass through opaque.
//!
//! # Invariants
//!
//! Each wire message name maps to exactly one enum variant (enforced by serde
//! tag dispatch plus exhaustive matching in the relay driver). Round-trip
//! encoding must produce identical values.

#![forbid(unsafe_code)]

pub mod b64;
mod envelope;
mod error;
mod message;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use message::{ClientMessage, InviteResponse, ServerMessage};
