//! Encryption-at-rest for channel credentials.
//!
//! A process-wide 256-bit key is derived once from a configured passphrase
//! via Argon2id. Secrets are sealed with XChaCha20-Poly1305 (random nonce
//! per call, nonce prepended to the ciphertext). Trait-based [`Cipher`]
//! design allows swapping the encryption backend.

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod vault;

pub use {
    cipher::{Cipher, XChaCha20Poly1305Cipher},
    error::VaultError,
    kdf::KdfParams,
    vault::SecretVault,
};
