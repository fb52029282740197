use {
    serde::{Deserialize, Serialize},
    std::path::PathBuf,
};

/// Configuration for the WhatsApp Web channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Where the automation library keeps its session profile. Treated as
    /// an opaque artifact; deleted on disconnect.
    pub profile_dir: PathBuf,

    /// Pause before re-initializing after a surface crash.
    pub recovery_delay_ms: u64,

    /// Attempts to delete the profile directory on disconnect. A just-
    /// terminated browser may briefly keep file handles open.
    pub purge_attempts: u32,

    /// Pause between profile deletion attempts.
    pub purge_retry_delay_ms: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from(".wa_profile"),
            recovery_delay_ms: 2_000,
            purge_attempts: 5,
            purge_retry_delay_ms: 200,
        }
    }
}
