//! Key material.

use x25519_dalek::{PublicKey as DalekPublic, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, KEY_SIZE};

/// An X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Parse from a byte slice, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                what: "public key",
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }
}

impl From<[u8; KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// An X25519 secret key. Zeroized on drop by the underlying implementation.
pub struct SecretKey(pub(crate) StaticSecret);

impl SecretKey {
    /// Derive from 32 seed bytes (clamped per X25519).
    pub fn from_seed(seed: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(seed))
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(*DalekPublic::from(&self.0).as_bytes())
    }
}

/// A long-lived identity keypair.
pub struct Keypair {
    /// Secret half, never leaves the client.
    pub secret: SecretKey,
    /// Public half, registered with the relay's key directory.
    pub public: PublicKey,
}

impl Keypair {
    /// Derive a keypair from 32 seed bytes.
    ///
    /// Callers are responsible for drawing the seed from a cryptographically
    /// secure source.
    pub fn from_seed(seed: [u8; KEY_SIZE]) -> Self {
        let secret = SecretKey::from_seed(seed);
        let public = secret.public_key();
        Self { secret, public }
    }
}

/// A 32-byte symmetric key for session or group traffic.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice, validating the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                what: "symmetric key",
                expected: KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.write_str("SymmetricKey(..)")
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SymmetricKey {}
