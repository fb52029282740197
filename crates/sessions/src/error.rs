//! Session store error types.

/// Errors produced by session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored secret failed to decrypt (tamper, wrong vault key).
    /// Callers must force re-authentication, never crash.
    #[error("stored secret is invalid, re-authentication required")]
    InvalidCredential,

    /// Encrypting a secret for storage failed.
    #[error("vault error: {0}")]
    Vault(#[from] omnibox_vault::VaultError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON (de)serialization of a history sub-record failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
