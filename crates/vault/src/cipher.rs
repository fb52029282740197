//! AEAD cipher seam and the default XChaCha20-Poly1305 backend.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use crate::error::VaultError;

/// Trait for authenticated encryption with associated data.
///
/// Each implementation carries a unique version tag stored as the first
/// byte of the sealed blob, so the backend can be migrated later without
/// re-encrypting everything up front.
pub trait Cipher: Send + Sync {
    /// One-byte identifier stored in the blob.
    fn version_tag(&self) -> u8;

    /// Encrypt `plaintext` under `key`, binding `aad` into the tag.
    /// Returns `[nonce || ciphertext || tag]`.
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// Decrypt a blob previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, key: &[u8; 32], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError>;
}

/// Version tag for the XChaCha20-Poly1305 backend.
pub const XCHACHA20_VERSION_TAG: u8 = 0x01;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
const NONCE_LEN: usize = 24;

/// XChaCha20-Poly1305 AEAD cipher.
///
/// Sealed blob layout: `[nonce: 24 bytes][ciphertext + Poly1305 tag: N + 16 bytes]`.
pub struct XChaCha20Poly1305Cipher;

impl Cipher for XChaCha20Poly1305Cipher {
    fn version_tag(&self) -> u8 {
        XCHACHA20_VERSION_TAG
    }

    #[allow(deprecated)]
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        let cipher = XChaCha20Poly1305::new(key.into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload {
                msg: plaintext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    #[allow(deprecated)]
    fn decrypt(&self, key: &[u8; 32], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        if blob.len() < NONCE_LEN + 16 {
            return Err(VaultError::Cipher("blob too short".to_string()));
        }

        let (nonce_bytes, ct) = blob.split_at(NONCE_LEN);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(key.into());

        cipher
            .decrypt(nonce, Payload { msg: ct, aad })
            .map_err(|e| VaultError::Cipher(e.to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x5au8; 32];

        let sealed = cipher.encrypt(&key, b"session-string", b"ctx").unwrap();
        let opened = cipher.decrypt(&key, &sealed, b"ctx").unwrap();
        assert_eq!(opened, b"session-string");
    }

    #[test]
    fn wrong_key_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let sealed = cipher.encrypt(&[0x5au8; 32], b"secret", b"").unwrap();
        assert!(cipher.decrypt(&[0x5bu8; 32], &sealed, b"").is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x5au8; 32];
        let sealed = cipher
            .encrypt(&key, b"secret", b"session:alice:mail")
            .unwrap();
        assert!(
            cipher
                .decrypt(&key, &sealed, b"session:mallory:mail")
                .is_err()
        );
    }

    #[test]
    fn tampered_blob_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x5au8; 32];
        let mut sealed = cipher.encrypt(&key, b"secret", b"").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(cipher.decrypt(&key, &sealed, b"").is_err());
    }

    #[test]
    fn truncated_blob_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        assert!(cipher.decrypt(&[0x5au8; 32], &[0u8; 12], b"").is_err());
    }

    #[test]
    fn nonces_are_random() {
        let cipher = XChaCha20Poly1305Cipher;
        let key = [0x5au8; 32];
        let a = cipher.encrypt(&key, b"same input", b"").unwrap();
        let b = cipher.encrypt(&key, b"same input", b"").unwrap();
        assert_ne!(a, b);
    }
}
