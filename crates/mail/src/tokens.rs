use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Refresh this many seconds before the provider-reported expiry.
const EXPIRY_SKEW_SECS: u64 = 60;

/// A stored OAuth token pair.
///
/// Round-trips through the session store as JSON; the store encrypts the
/// whole serialized blob, so exposing the secrets to serde here is safe.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,

    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<Secret<String>>,

    /// Unix timestamp when the access token expires.
    pub expires_at: Option<u64>,
}

impl TokenSet {
    /// Whether the access token is past (or within a minute of) expiry.
    /// Tokens without a recorded expiry are assumed still valid.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now + EXPIRY_SKEW_SECS >= expires_at
    }

    /// Merge a fresh provider response over this stored set.
    ///
    /// Providers routinely omit `refresh_token` on refresh responses; the
    /// stored one must survive the merge rather than be clobbered.
    #[must_use]
    pub fn merged_with(&self, fresh: TokenSet) -> TokenSet {
        TokenSet {
            refresh_token: fresh.refresh_token.or_else(|| self.refresh_token.clone()),
            access_token: fresh.access_token,
            expires_at: fresh.expires_at,
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize a `Secret<String>` by exposing its inner value. Use only for
/// fields that must round-trip through encrypted storage.
pub fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Serialize an `Option<Secret<String>>` by exposing its inner value.
pub fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
