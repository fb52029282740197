//! Vault error types.

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Key derivation failed (bad parameters or salt).
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// Encryption or decryption failed (tampered blob, wrong key, wrong
    /// context). Callers must treat this as "credential invalid", never
    /// attempt to use partial output.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
