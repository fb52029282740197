use serde::{Deserialize, Serialize};

/// The three aggregated platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// OAuth-based mail provider.
    Mail,
    /// Interactive-login messaging network (phone → code → session token).
    Telegram,
    /// Browser-session messaging network (QR handshake).
    WhatsApp,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Mail, Platform::Telegram, Platform::WhatsApp];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mail => "mail",
            Platform::Telegram => "telegram",
            Platform::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mail" => Ok(Platform::Mail),
            "telegram" => Ok(Platform::Telegram),
            "whatsapp" => Ok(Platform::WhatsApp),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}
