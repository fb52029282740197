//! The vault itself: passphrase-keyed seal/open of credential strings.

use {base64::Engine, zeroize::Zeroizing};

use crate::{
    cipher::{Cipher, XChaCha20Poly1305Cipher},
    error::VaultError,
    kdf::{self, KdfParams},
};

/// Seals and opens credential strings with a key derived once per process.
///
/// Stateless after construction; safe to share across tasks without
/// locking. Generic over [`Cipher`] but defaults to
/// [`XChaCha20Poly1305Cipher`].
pub struct SecretVault<C: Cipher = XChaCha20Poly1305Cipher> {
    cipher: C,
    key: Zeroizing<[u8; 32]>,
}

impl SecretVault<XChaCha20Poly1305Cipher> {
    /// Derive the vault key from a passphrase and a base64 salt with
    /// default Argon2id costs.
    pub fn derive(passphrase: &str, salt_b64: &str) -> Result<Self, VaultError> {
        Self::derive_with_params(passphrase, salt_b64, &KdfParams::default())
    }

    /// Derive the vault key with explicit KDF costs.
    pub fn derive_with_params(
        passphrase: &str,
        salt_b64: &str,
        params: &KdfParams,
    ) -> Result<Self, VaultError> {
        let salt = kdf::decode_salt(salt_b64)?;
        let key = kdf::derive_master_key(passphrase.as_bytes(), &salt, params)?;
        Ok(Self {
            cipher: XChaCha20Poly1305Cipher,
            key,
        })
    }
}

impl<C: Cipher> SecretVault<C> {
    /// Build a vault around an already-derived key and a custom cipher.
    pub fn with_cipher(cipher: C, key: Zeroizing<[u8; 32]>) -> Self {
        Self { cipher, key }
    }

    /// Encrypt a string into a versioned base64 envelope.
    ///
    /// `aad` binds the blob to its record context (e.g.
    /// `"session:alice:mail"`) so a blob copied between rows will not open.
    pub fn encrypt(&self, plaintext: &str, aad: &str) -> Result<String, VaultError> {
        let sealed = self
            .cipher
            .encrypt(&self.key, plaintext.as_bytes(), aad.as_bytes())?;

        let mut blob = Vec::with_capacity(1 + sealed.len());
        blob.push(self.cipher.version_tag());
        blob.extend_from_slice(&sealed);

        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    /// Decrypt a base64 envelope back to the original string.
    ///
    /// Fails closed: tamper, truncation, wrong key, or wrong `aad` returns
    /// an error rather than garbage.
    pub fn decrypt(&self, b64: &str, aad: &str) -> Result<String, VaultError> {
        let blob = base64::engine::general_purpose::STANDARD.decode(b64)?;
        if blob.is_empty() {
            return Err(VaultError::Cipher("empty blob".to_string()));
        }

        let version = blob[0];
        if version != self.cipher.version_tag() {
            return Err(VaultError::Cipher(format!(
                "unsupported cipher version: {version:#04x}"
            )));
        }

        let plaintext = self.cipher.decrypt(&self.key, &blob[1..], aad.as_bytes())?;
        String::from_utf8(plaintext).map_err(|e| VaultError::Cipher(e.to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault() -> SecretVault {
        let params = KdfParams {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        };
        SecretVault::derive_with_params("orchestrator-test-passphrase", &kdf::generate_salt(), &params)
            .unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let vault = test_vault();
        let blob = vault.encrypt("1BQANOTEwMTc...session", "session:u1:telegram").unwrap();
        let plain = vault.decrypt(&blob, "session:u1:telegram").unwrap();
        assert_eq!(plain, "1BQANOTEwMTc...session");
    }

    #[test]
    fn arbitrary_strings_round_trip() {
        let vault = test_vault();
        let long = "x".repeat(10_000);
        for input in ["", "a", "ünïcødé ✓", long.as_str()] {
            let blob = vault.encrypt(input, "ctx").unwrap();
            assert_eq!(vault.decrypt(&blob, "ctx").unwrap(), input);
        }
    }

    #[test]
    fn tampered_envelope_fails_closed() {
        let vault = test_vault();
        let blob = vault.encrypt("token", "ctx").unwrap();

        // Flip one byte in the middle of the base64 payload.
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(&blob)
            .unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        let tampered = base64::engine::general_purpose::STANDARD.encode(bytes);

        assert!(matches!(
            vault.decrypt(&tampered, "ctx"),
            Err(VaultError::Cipher(_))
        ));
    }

    #[test]
    fn wrong_context_fails_closed() {
        let vault = test_vault();
        let blob = vault.encrypt("token", "session:u1:mail").unwrap();
        assert!(vault.decrypt(&blob, "session:u2:mail").is_err());
    }

    #[test]
    fn different_keys_do_not_interoperate() {
        let v1 = test_vault();
        let v2 = test_vault(); // fresh random salt → different key
        let blob = v1.encrypt("token", "ctx").unwrap();
        assert!(v2.decrypt(&blob, "ctx").is_err());
    }

    #[test]
    fn unknown_version_rejected() {
        let vault = test_vault();
        let blob = vault.encrypt("token", "ctx").unwrap();
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(&blob)
            .unwrap();
        bytes[0] = 0x7f;
        let reversioned = base64::engine::general_purpose::STANDARD.encode(bytes);
        assert!(vault.decrypt(&reversioned, "ctx").is_err());
    }

    #[test]
    fn invalid_base64_rejected() {
        let vault = test_vault();
        assert!(matches!(
            vault.decrypt("not!!base64??", "ctx"),
            Err(VaultError::Base64(_))
        ));
    }
}
