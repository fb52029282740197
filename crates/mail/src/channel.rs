//! The mail channel: persisted token lifecycle around [`AuthCodeFlow`].

use std::sync::Arc;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::{info, warn},
};

use {
    omnibox_channels::{ChannelError, ChannelStatus, Result},
    omnibox_sessions::{ChannelSession, Platform, SessionStore, StoreError},
};

use crate::{config::MailOauthConfig, flow::AuthCodeFlow, tokens::TokenSet};

/// A validated handle for mail API calls.
///
/// Existence of this value means an unexpired access token was available
/// (refreshing silently if needed); it is the only thing message-fetch and
/// send code ever sees.
pub struct MailClient {
    user_id: String,
    access_token: Secret<String>,
}

impl MailClient {
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}

/// OAuth mail channel backed by the session store.
pub struct MailChannel {
    store: Arc<SessionStore>,
    flow: AuthCodeFlow,
}

impl MailChannel {
    pub fn new(store: Arc<SessionStore>, config: MailOauthConfig) -> Self {
        Self {
            store,
            flow: AuthCodeFlow::new(config),
        }
    }

    /// Redirect target for the user's browser. `force_consent` re-prompts
    /// the provider even when a prior grant exists.
    pub fn auth_url(&self, force_consent: bool) -> Result<String> {
        self.flow.authorization_url(force_consent)
    }

    /// Exchange the callback code and persist the resulting token pair.
    ///
    /// A persistence failure fails the whole operation: tokens that were
    /// not durably stored are not presented as a connected session.
    pub async fn exchange_code(&self, user_id: &str, code: &str) -> Result<()> {
        let tokens = self.flow.exchange_code(code).await?;
        self.persist_tokens(user_id, &tokens).await?;
        info!(user_id, "mail tokens obtained and stored");
        Ok(())
    }

    /// An authenticated client, or `None` when this user is not connected.
    ///
    /// `None` is not an error — callers surface it as "not connected".
    /// Expired access tokens are refreshed silently; the refreshed pair is
    /// persisted merged with the stored one, so a refresh token the
    /// provider chose not to resend survives.
    pub async fn client(&self, user_id: &str) -> Result<Option<MailClient>> {
        let session = match self.store.find_active(user_id, Platform::Mail).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(StoreError::InvalidCredential) => {
                warn!(user_id, "stored mail tokens invalid, forcing re-auth");
                self.deactivate_quietly(user_id).await;
                return Ok(None);
            },
            Err(e) => return Err(ChannelError::external("session lookup failed", e)),
        };

        let Some(secret) = session.secret else {
            return Ok(None);
        };
        let stored: TokenSet = match serde_json::from_str(&secret) {
            Ok(t) => t,
            Err(e) => {
                warn!(user_id, error = %e, "stored mail tokens unparseable, forcing re-auth");
                self.deactivate_quietly(user_id).await;
                return Ok(None);
            },
        };

        let tokens = if stored.is_expired() {
            match self.refresh_tokens(user_id, &stored).await? {
                Some(fresh) => fresh,
                None => return Ok(None),
            }
        } else {
            stored
        };

        if let Err(e) = self.store.touch(user_id, Platform::Mail).await {
            warn!(user_id, error = %e, "failed to bump mail last_sync");
        }

        Ok(Some(MailClient {
            user_id: user_id.to_string(),
            access_token: tokens.access_token,
        }))
    }

    async fn refresh_tokens(&self, user_id: &str, stored: &TokenSet) -> Result<Option<TokenSet>> {
        let Some(refresh_token) = stored.refresh_token.as_ref() else {
            warn!(user_id, "mail access token expired with no refresh token");
            self.deactivate_quietly(user_id).await;
            return Ok(None);
        };

        match self.flow.refresh(refresh_token.expose_secret()).await {
            Ok(fresh) => {
                let merged = stored.merged_with(fresh);
                self.persist_tokens(user_id, &merged).await?;
                info!(user_id, "mail access token refreshed");
                Ok(Some(merged))
            },
            Err(ChannelError::UpstreamRejected { message }) => {
                warn!(user_id, message, "mail token refresh rejected, grant revoked or expired");
                self.deactivate_quietly(user_id).await;
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    async fn persist_tokens(&self, user_id: &str, tokens: &TokenSet) -> Result<()> {
        let secret = serde_json::to_string(tokens)
            .map_err(|e| ChannelError::persistence(format!("token serialization: {e}")))?;
        self.store
            .upsert(&ChannelSession::active(
                user_id,
                Platform::Mail,
                Some(secret),
            ))
            .await
            .map_err(|e| ChannelError::persistence(e.to_string()))
    }

    async fn deactivate_quietly(&self, user_id: &str) {
        if let Err(e) = self.store.deactivate(user_id, Platform::Mail).await {
            warn!(user_id, error = %e, "failed to deactivate mail session");
        }
    }
}

#[async_trait]
impl ChannelStatus for MailChannel {
    async fn connected(&self, user_id: &str) -> Result<bool> {
        match self.store.find_active(user_id, Platform::Mail).await {
            Ok(session) => Ok(session.is_some()),
            // Undecryptable tokens mean a re-auth is needed: not connected.
            Err(StoreError::InvalidCredential) => Ok(false),
            Err(e) => Err(ChannelError::external("session lookup failed", e)),
        }
    }

    /// Delete persisted tokens. Disconnecting an already-disconnected
    /// channel is success, not an error.
    async fn disconnect(&self, user_id: &str) -> Result<()> {
        self.store
            .remove(user_id, Platform::Mail)
            .await
            .map_err(|e| ChannelError::external("token removal failed", e))?;
        info!(user_id, "mail disconnected");
        Ok(())
    }
}
