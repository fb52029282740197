//! SQLite-backed session store with field-level secret encryption.

use std::sync::Arc;

use {sqlx::SqlitePool, tracing::warn};

use omnibox_vault::SecretVault;

use crate::{
    error::StoreError,
    platform::Platform,
    record::{ChannelSession, ConversationSummary, HistoryMessage},
};

/// Messages retained per conversation. Older entries are trimmed so a
/// chatty conversation cannot grow a row without bound.
pub const HISTORY_CAP: usize = 100;

/// Current unix time in seconds.
pub(crate) fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Per-user, per-platform persisted session records.
///
/// The `secret` column is encrypted on write and decrypted on read, so
/// every component above this store speaks only plaintext secrets. Keyed
/// SQL operations make the store safe for concurrent use across channels
/// and users without cross-key locking.
pub struct SessionStore {
    pool: SqlitePool,
    vault: Arc<SecretVault>,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, vault: Arc<SecretVault>) -> Self {
        Self { pool, vault }
    }

    /// Create the session tables. Call once at application startup.
    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channel_sessions (
                user_id    TEXT NOT NULL,
                platform   TEXT NOT NULL,
                secret     TEXT,
                is_active  INTEGER NOT NULL DEFAULT 0,
                last_sync  INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, platform)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                user_id         TEXT NOT NULL,
                platform        TEXT NOT NULL,
                chat_id         TEXT NOT NULL,
                contact_name    TEXT,
                last_message    TEXT,
                last_message_at INTEGER NOT NULL,
                history         TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (user_id, platform, chat_id)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn secret_context(user_id: &str, platform: Platform) -> String {
        format!("session:{user_id}:{platform}")
    }

    /// Insert or replace the record for `{user_id, platform}`.
    ///
    /// Whole-row atomic replace: concurrent upserts for the same key are
    /// last-write-wins with no torn writes. Conversation sub-records are
    /// untouched.
    pub async fn upsert(&self, session: &ChannelSession) -> Result<(), StoreError> {
        let encrypted = match &session.secret {
            Some(plain) => Some(self.vault.encrypt(
                plain,
                &Self::secret_context(&session.user_id, session.platform),
            )?),
            None => None,
        };

        sqlx::query(
            "INSERT INTO channel_sessions (user_id, platform, secret, is_active, last_sync, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, platform) DO UPDATE SET
                 secret     = excluded.secret,
                 is_active  = excluded.is_active,
                 last_sync  = excluded.last_sync,
                 updated_at = excluded.updated_at",
        )
        .bind(&session.user_id)
        .bind(session.platform.as_str())
        .bind(&encrypted)
        .bind(session.is_active)
        .bind(session.last_sync)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load the record for `{user_id, platform}`, decrypting the secret.
    ///
    /// A secret that fails to decrypt yields [`StoreError::InvalidCredential`]
    /// so callers can force re-authentication instead of crashing.
    pub async fn find(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<ChannelSession>, StoreError> {
        let row: Option<(Option<String>, bool, i64)> = sqlx::query_as(
            "SELECT secret, is_active, last_sync FROM channel_sessions
             WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((encrypted, is_active, last_sync)) = row else {
            return Ok(None);
        };

        let secret = match encrypted {
            Some(blob) => {
                let context = Self::secret_context(user_id, platform);
                match self.vault.decrypt(&blob, &context) {
                    Ok(plain) => Some(plain),
                    Err(e) => {
                        warn!(user_id, platform = %platform, error = %e, "stored secret failed to decrypt");
                        return Err(StoreError::InvalidCredential);
                    },
                }
            },
            None => None,
        };

        Ok(Some(ChannelSession {
            user_id: user_id.to_string(),
            platform,
            secret,
            is_active,
            last_sync,
        }))
    }

    /// Like [`find`](Self::find) but only returns active sessions.
    pub async fn find_active(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<ChannelSession>, StoreError> {
        Ok(self
            .find(user_id, platform)
            .await?
            .filter(|s| s.is_active))
    }

    /// Mark the session inactive. Succeeds when no record exists.
    pub async fn deactivate(&self, user_id: &str, platform: Platform) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE channel_sessions SET is_active = 0, updated_at = ?
             WHERE user_id = ? AND platform = ?",
        )
        .bind(now_epoch())
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the session record outright. Succeeds when no record exists.
    pub async fn remove(&self, user_id: &str, platform: Platform) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM channel_sessions WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump `last_sync` to now. Called on every successful platform use.
    pub async fn touch(&self, user_id: &str, platform: Platform) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE channel_sessions SET last_sync = ?, updated_at = ?
             WHERE user_id = ? AND platform = ?",
        )
        .bind(now_epoch())
        .bind(now_epoch())
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Conversation history sub-records ────────────────────────────────

    /// Append a message to a conversation's history, trimming to
    /// [`HISTORY_CAP`] entries, and refresh the conversation summary.
    pub async fn append_message(
        &self,
        user_id: &str,
        platform: Platform,
        chat_id: &str,
        contact_name: Option<&str>,
        message: HistoryMessage,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT history FROM conversations
             WHERE user_id = ? AND platform = ? AND chat_id = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(chat_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut history: Vec<HistoryMessage> = match row {
            Some((json,)) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };
        history.push(message.clone());
        if history.len() > HISTORY_CAP {
            let excess = history.len() - HISTORY_CAP;
            history.drain(..excess);
        }
        let history_json = serde_json::to_string(&history)?;

        sqlx::query(
            "INSERT INTO conversations (user_id, platform, chat_id, contact_name, last_message, last_message_at, history)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, platform, chat_id) DO UPDATE SET
                 contact_name    = COALESCE(excluded.contact_name, conversations.contact_name),
                 last_message    = excluded.last_message,
                 last_message_at = excluded.last_message_at,
                 history         = excluded.history",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(chat_id)
        .bind(contact_name)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(&history_json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Read back up to `limit` most recent messages for one conversation.
    pub async fn conversation_history(
        &self,
        user_id: &str,
        platform: Platform,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT history FROM conversations
             WHERE user_id = ? AND platform = ? AND chat_id = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((json,)) = row else {
            return Ok(Vec::new());
        };
        let history: Vec<HistoryMessage> = serde_json::from_str(&json)?;
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    /// Conversation summaries for a user, newest first.
    pub async fn conversations(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows: Vec<(String, Option<String>, Option<String>, i64)> = sqlx::query_as(
            "SELECT chat_id, contact_name, last_message, last_message_at FROM conversations
             WHERE user_id = ? AND platform = ?
             ORDER BY last_message_at DESC",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(chat_id, contact_name, last_message, last_message_at)| ConversationSummary {
                    chat_id,
                    contact_name,
                    last_message,
                    last_message_at,
                },
            )
            .collect())
    }
}
