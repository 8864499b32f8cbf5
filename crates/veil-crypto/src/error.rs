//! Crypto errors.

use thiserror::Error;

/// Errors from seal/open operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication failed: wrong key, tampered ciphertext, or tampered
    /// nonce. The payload must be discarded.
    #[error("decryption failed: authentication error")]
    DecryptionFailed,

    /// A key or nonce had the wrong length.
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// What was being parsed.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
}
