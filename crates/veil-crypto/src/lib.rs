//! Veil cryptographic primitives.
//!
//! Two authenticated-encryption surfaces, mirroring the NaCl `box` /
//! `secretbox` pair:
//!
//! - [`seal`] / [`open`]: public-key authenticated encryption. Static-static
//!   X25519 Diffie-Hellman, HKDF-SHA256 key derivation, XChaCha20-Poly1305
//!   AEAD. Only the two keypair holders can produce or open a box.
//! - [`seal_secret`] / [`open_secret`]: symmetric authenticated encryption
//!   under an established 32-byte session key.
//!
//! All functions are pure: nonces and key seeds are provided by the caller.
//! This keeps the action-based state machines deterministic under test.
//! Nonces are 24 bytes (XChaCha20 extended nonces, safe to generate
//! randomly); a fresh nonce is required per seal operation.
//!
//! # Security
//!
//! - Decryption fails closed: any wrong key, altered ciphertext, or altered
//!   nonce yields an error, never incorrect plaintext.
//! - Secret material ([`SecretKey`], [`SymmetricKey`]) is zeroized on drop.
//! - The box shared secret is domain-separated through HKDF so it can never
//!   collide with keys derived elsewhere.

#![forbid(unsafe_code)]

mod box_;
mod error;
mod keys;
mod secretbox;

pub use box_::{open, seal};
pub use error::CryptoError;
pub use keys::{Keypair, PublicKey, SecretKey, SymmetricKey};
pub use secretbox::{open_secret, seal_secret};

/// Size of public, secret and symmetric keys in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
