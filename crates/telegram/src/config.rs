use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Configuration for the Telegram channel.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Application ID issued by the network.
    pub api_id: i32,

    /// Application hash issued by the network.
    #[serde(serialize_with = "serialize_secret")]
    pub api_hash: Secret<String>,

    /// How long a pending login waits for human input before it is
    /// evicted and the attempt fails.
    pub login_ttl_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_id: 0,
            api_hash: Secret::new(String::new()),
            login_ttl_secs: 600,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("login_ttl_secs", &self.login_ttl_secs)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use secrecy::ExposeSecret;
    serializer.serialize_str(secret.expose_secret())
}
