//! Symmetric authenticated encryption.
//!
//! XChaCha20-Poly1305 under an established 32-byte key. Used for all traffic
//! after a session or group key has been agreed.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{CryptoError, NONCE_SIZE, SymmetricKey};

/// Seal `plaintext` under `key`. The nonce must be fresh random bytes.
pub fn seal_secret(plaintext: &[u8], nonce: &[u8; NONCE_SIZE], key: &SymmetricKey) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    ciphertext
}

/// Open a secretbox. Fails closed on any single-bit change to ciphertext,
/// nonce, or key.
pub fn open_secret(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &SymmetricKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}
