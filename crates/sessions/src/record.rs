use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// A persisted channel session, plaintext on this side of the store.
///
/// At most one record exists per `{user_id, platform}`. The secret is
/// `None` for the browser channel, whose session lives in an on-disk
/// profile bundle rather than a storable token.
#[derive(Debug, Clone)]
pub struct ChannelSession {
    pub user_id: String,
    pub platform: Platform,
    pub secret: Option<String>,
    pub is_active: bool,
    /// Unix seconds; bumped on every successful use, not just on login.
    pub last_sync: i64,
}

impl ChannelSession {
    /// A freshly authenticated session with `last_sync` set to now.
    #[must_use]
    pub fn active(user_id: impl Into<String>, platform: Platform, secret: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
            secret,
            is_active: true,
            last_sync: crate::store::now_epoch(),
        }
    }
}

/// One message in a conversation's capped history sub-record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub text: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// "sent", "delivered", "read", "received", "failed".
    pub status: String,
}

/// Per-chat summary row kept alongside the history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub chat_id: String,
    pub contact_name: Option<String>,
    pub last_message: Option<String>,
    /// Unix seconds.
    pub last_message_at: i64,
}
