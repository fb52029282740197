//! Argon2id derivation of the process-wide vault key from a passphrase.

use {argon2::Argon2, zeroize::Zeroizing};

use crate::error::VaultError;

/// Argon2id cost parameters.
///
/// The defaults are deliberately slow; tests lower them to keep the suite
/// fast.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 64 MiB = 65536).
    pub m_cost: u32,
    /// Number of iterations (default: 3).
    pub t_cost: u32,
    /// Degree of parallelism (default: 1).
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MiB
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
pub fn derive_master_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let argon2_params = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| VaultError::Kdf(format!("invalid parameters: {e}")))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, key.as_mut())
        .map_err(|e| VaultError::Kdf(e.to_string()))?;

    Ok(key)
}

/// Generate a random 16-byte salt, base64-encoded for storage in config.
pub fn generate_salt() -> String {
    use {base64::Engine, rand::RngCore};

    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    base64::engine::general_purpose::STANDARD.encode(salt)
}

/// Decode a base64-encoded salt back to raw bytes.
pub fn decode_salt(b64: &str) -> Result<Vec<u8>, VaultError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(VaultError::Base64)
}
