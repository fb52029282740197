use std::{collections::HashMap, future::Future, sync::Arc};

use tracing::warn;

use {
    omnibox_channels::{ChannelError, ChannelStatus, Result},
    omnibox_mail::{MailChannel, MailClient},
    omnibox_sessions::Platform,
    omnibox_telegram::{LoginStage, SubmitOutcome, TelegramChannel, TelegramClientHandle},
    omnibox_whatsapp::{ChatSummary, ConnectOutcome, WhatsAppChannel},
};

/// Uniform façade over the three channel session subsystems.
pub struct ChannelSessionManager {
    mail: Arc<MailChannel>,
    telegram: Arc<TelegramChannel>,
    whatsapp: Arc<WhatsAppChannel>,
}

impl ChannelSessionManager {
    pub fn new(
        mail: Arc<MailChannel>,
        telegram: Arc<TelegramChannel>,
        whatsapp: Arc<WhatsAppChannel>,
    ) -> Self {
        Self {
            mail,
            telegram,
            whatsapp,
        }
    }

    fn channel(&self, platform: Platform) -> &dyn ChannelStatus {
        match platform {
            Platform::Mail => self.mail.as_ref(),
            Platform::Telegram => self.telegram.as_ref(),
            Platform::WhatsApp => self.whatsapp.as_ref(),
        }
    }

    /// Per-platform connectivity for a user.
    ///
    /// Best-effort advisory: a channel whose probe errors (store down,
    /// invalid credential, dead surface) reports `false`. This method
    /// never returns an error — callers must not hard-depend on
    /// connectivity checks.
    pub async fn status(&self, user_id: &str) -> HashMap<Platform, bool> {
        let mut statuses = HashMap::new();
        for platform in Platform::ALL {
            let connected = match self.channel(platform).connected(user_id).await {
                Ok(connected) => connected,
                Err(e) => {
                    warn!(user_id, platform = %platform, error = %e, "status probe failed, reporting disconnected");
                    false
                },
            };
            statuses.insert(platform, connected);
        }
        statuses
    }

    /// Tear down a platform session. Idempotent — a platform with no
    /// existing session disconnects successfully.
    pub async fn disconnect(&self, user_id: &str, platform: Platform) -> Result<()> {
        self.channel(platform).disconnect(user_id).await
    }

    // ── Mail pass-throughs ──────────────────────────────────────────────

    pub fn mail_auth_url(&self, force_consent: bool) -> Result<String> {
        self.mail.auth_url(force_consent)
    }

    pub async fn mail_exchange_code(&self, user_id: &str, code: &str) -> Result<()> {
        self.mail.exchange_code(user_id, code).await
    }

    /// `None` means "not connected" — never an error.
    pub async fn mail_client(&self, user_id: &str) -> Result<Option<MailClient>> {
        self.mail.client(user_id).await
    }

    // ── Telegram pass-throughs ──────────────────────────────────────────

    /// Begin an interactive login; returns once the code request is
    /// underway. Progress is observed via [`status`](Self::status) and
    /// [`telegram_login_stage`](Self::telegram_login_stage).
    pub fn telegram_start_login(&self, user_id: &str, phone: &str) {
        self.telegram.start_login(user_id, phone);
    }

    pub fn telegram_submit_code(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<SubmitOutcome> {
        self.telegram.submit_code(phone, code, password)
    }

    /// `Some(AwaitingPassword)` is what the HTTP layer renders as
    /// "second factor required".
    pub fn telegram_login_stage(&self, phone: &str) -> Option<LoginStage> {
        self.telegram.login_stage(phone)
    }

    pub async fn telegram_client(&self, user_id: &str) -> Result<Option<TelegramClientHandle>> {
        self.telegram.client(user_id).await
    }

    // ── WhatsApp pass-throughs ──────────────────────────────────────────

    /// Poll the QR handshake; starts initialization when idle.
    pub async fn whatsapp_connect(&self, user_id: &str) -> Result<ConnectOutcome> {
        self.whatsapp.connect(user_id).await
    }

    pub async fn whatsapp_send(&self, user_id: &str, chat_id: &str, text: &str) -> Result<String> {
        self.whatsapp
            .send_text(user_id, chat_id, text)
            .await
            .map_err(Self::mask_automation_failure)
    }

    pub async fn whatsapp_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        self.whatsapp
            .list_chats(user_id)
            .await
            .map_err(Self::mask_automation_failure)
    }

    /// A crashed surface is recovered automatically; callers only ever
    /// see a temporary "not connected".
    fn mask_automation_failure(err: ChannelError) -> ChannelError {
        match err {
            ChannelError::TransientAutomationFailure { message } => {
                warn!(message, "automation surface failure masked as not-connected");
                ChannelError::NotConnected
            },
            other => other,
        }
    }
}
