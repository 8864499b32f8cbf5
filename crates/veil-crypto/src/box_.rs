//! Public-key authenticated encryption.
//!
//! Static-static X25519 Diffie-Hellman, HKDF-SHA256, XChaCha20-Poly1305.
//! Either keypair holder can seal for the other; opening authenticates the
//! sender because only the two keypairs can reach the shared secret.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::PublicKey as DalekPublic;
use zeroize::Zeroize;

use crate::{CryptoError, KEY_SIZE, NONCE_SIZE, PublicKey, SecretKey};

/// HKDF info string for domain separation.
const HKDF_INFO: &[u8] = b"veil-box-xchacha20poly1305-v1";

/// Derive the pairwise AEAD key from the DH shared secret.
fn pairwise_key(their_public: &PublicKey, my_secret: &SecretKey) -> [u8; KEY_SIZE] {
    let their_dalek = DalekPublic::from(*their_public.as_bytes());
    let mut shared = *my_secret.0.diffie_hellman(&their_dalek).as_bytes();

    let hk = Hkdf::<Sha256>::new(None, &shared);
    let mut key = [0u8; KEY_SIZE];
    let Ok(()) = hk.expand(HKDF_INFO, &mut key) else {
        unreachable!("HKDF-SHA256 expand to 32 bytes cannot fail");
    };
    shared.zeroize();
    key
}

/// Seal `plaintext` for the holder of `their_public`.
///
/// The nonce must be fresh random bytes; it travels with the ciphertext.
pub fn seal(
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    their_public: &PublicKey,
    my_secret: &SecretKey,
) -> Vec<u8> {
    let mut key = pairwise_key(their_public, my_secret);
    let cipher = XChaCha20Poly1305::new((&key).into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };
    key.zeroize();
    ciphertext
}

/// Open a box sealed by the holder of `their_public`.
///
/// Fails closed on any wrong key, tampered ciphertext, or tampered nonce.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    their_public: &PublicKey,
    my_secret: &SecretKey,
) -> Result<Vec<u8>, CryptoError> {
    let mut key = pairwise_key(their_public, my_secret);
    let cipher = XChaCha20Poly1305::new((&key).into());
    let result = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed);
    key.zeroize();
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::Keypair;

    fn pair(seed: u8) -> Keypair {
        Keypair::from_seed([seed; 32])
    }

    #[test]
    fn seal_open_round_trip() {
        let alice = pair(1);
        let bob = pair(2);
        let nonce = [9u8; NONCE_SIZE];

        let boxed = seal(b"hello", &nonce, &bob.public, &alice.secret);
        let opened = open(&boxed, &nonce, &alice.public, &bob.secret).unwrap();
        assert_eq!(opened, b"hello");
    }

    #[test]
    fn box_is_symmetric_between_the_pair() {
        // open(seal(m, n, pkB, skA), n, pkA, skB) == m in both directions
        let alice = pair(3);
        let bob = pair(4);
        let nonce = [1u8; NONCE_SIZE];

        let from_bob = seal(b"reply", &nonce, &alice.public, &bob.secret);
        assert_eq!(open(&from_bob, &nonce, &bob.public, &alice.secret).unwrap(), b"reply");
    }

    #[test]
    fn wrong_keypair_fails() {
        let alice = pair(5);
        let bob = pair(6);
        let mallory = pair(7);
        let nonce = [0u8; NONCE_SIZE];

        let boxed = seal(b"secret", &nonce, &bob.public, &alice.secret);
        assert!(open(&boxed, &nonce, &alice.public, &mallory.secret).is_err());
        assert!(open(&boxed, &nonce, &mallory.public, &bob.secret).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let alice = pair(8);
        let bob = pair(9);
        let nonce = [2u8; NONCE_SIZE];

        let mut boxed = seal(b"secret", &nonce, &bob.public, &alice.secret);
        boxed[0] ^= 0x01;
        assert!(open(&boxed, &nonce, &alice.public, &bob.secret).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let alice = pair(10);
        let bob = pair(11);
        let nonce = [3u8; NONCE_SIZE];

        let boxed = seal(b"secret", &nonce, &bob.public, &alice.secret);
        let mut wrong = nonce;
        wrong[0] ^= 0x01;
        assert!(open(&boxed, &wrong, &alice.public, &bob.secret).is_err());
    }

    #[test]
    fn ciphertext_overhead_is_tag_size() {
        let alice = pair(12);
        let bob = pair(13);
        let nonce = [4u8; NONCE_SIZE];

        let boxed = seal(b"0123456789", &nonce, &bob.public, &alice.secret);
        assert_eq!(boxed.len(), 10 + crate::TAG_SIZE);
    }
}
