//! The Telegram channel: login orchestration around the session store.

use std::{future::Future, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info, warn},
};

use {
    omnibox_channels::{ChannelError, ChannelStatus, Result},
    omnibox_sessions::{ChannelSession, Platform, SessionStore, StoreError},
};

use crate::{
    config::TelegramConfig,
    connector::{ConnectorError, TelegramConnector},
    login::{LoginStage, PendingLogins, SubmitOutcome},
};

/// How often the sweeper looks for abandoned pending logins.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A validated handle for Telegram message operations.
pub struct TelegramClientHandle {
    user_id: String,
    session: Secret<String>,
}

impl TelegramClientHandle {
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The serialized session the client library resumes from.
    #[must_use]
    pub fn session_string(&self) -> &str {
        self.session.expose_secret()
    }
}

/// Acknowledgement returned by [`TelegramChannel::start_login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStart {
    /// The network was asked to deliver a code; poll status for progress.
    CodeRequested,
}

/// Interactive-login channel for Telegram.
pub struct TelegramChannel {
    store: Arc<SessionStore>,
    connector: Arc<dyn TelegramConnector>,
    logins: PendingLogins,
}

impl TelegramChannel {
    pub fn new(
        store: Arc<SessionStore>,
        connector: Arc<dyn TelegramConnector>,
        config: &TelegramConfig,
    ) -> Self {
        Self {
            store,
            connector,
            logins: PendingLogins::new(Duration::from_secs(config.login_ttl_secs)),
        }
    }

    /// Begin a login for `phone` and return immediately.
    ///
    /// The actual sign-in runs as its own task, suspended on the
    /// rendezvous until [`submit_code`](Self::submit_code) feeds it. A
    /// prior pending login for the same phone is superseded.
    pub fn start_login(&self, user_id: &str, phone: &str) -> LoginStart {
        let exchange = self.logins.register(user_id, phone);
        let attempt_id = exchange.attempt_id();

        info!(user_id, phone, "telegram login started, code requested");

        let connector = Arc::clone(&self.connector);
        let store = Arc::clone(&self.store);
        let logins = self.logins.clone();
        let user_id = user_id.to_string();
        let phone = phone.to_string();

        tokio::spawn(async move {
            match connector.sign_in(&phone, exchange).await {
                Ok(session) => {
                    let record =
                        ChannelSession::active(&user_id, Platform::Telegram, Some(session));
                    // The attempt is only authenticated if durably stored.
                    match store.upsert(&record).await {
                        Ok(()) => info!(user_id, phone, "telegram login authenticated"),
                        Err(e) => {
                            warn!(user_id, phone, error = %e, "telegram session persistence failed, login not activated");
                        },
                    }
                },
                Err(ConnectorError::Abandoned) => {
                    debug!(user_id, phone, "telegram login abandoned");
                },
                Err(e) => {
                    warn!(user_id, phone, error = %e, "telegram login failed");
                },
            }
            logins.discard(&phone, attempt_id);
        });

        LoginStart::CodeRequested
    }

    /// Relay a code (and optionally the 2FA password) into the pending
    /// login for `phone`. Completion is observed by polling status.
    pub fn submit_code(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<SubmitOutcome> {
        self.logins.submit(phone, code, password)
    }

    /// Stage of the pending login for `phone`, if one is in flight.
    /// `AwaitingPassword` is what the HTTP layer surfaces as
    /// "second factor required".
    pub fn login_stage(&self, phone: &str) -> Option<LoginStage> {
        self.logins.stage(phone)
    }

    /// An authenticated handle, or `None` when this user is not
    /// connected. Use bumps `last_sync`.
    pub async fn client(&self, user_id: &str) -> Result<Option<TelegramClientHandle>> {
        let session = match self.store.find_active(user_id, Platform::Telegram).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(StoreError::InvalidCredential) => {
                warn!(user_id, "stored telegram session invalid, forcing re-auth");
                if let Err(e) = self.store.deactivate(user_id, Platform::Telegram).await {
                    warn!(user_id, error = %e, "failed to deactivate telegram session");
                }
                return Ok(None);
            },
            Err(e) => return Err(ChannelError::external("session lookup failed", e)),
        };

        let Some(secret) = session.secret else {
            return Ok(None);
        };

        if let Err(e) = self.store.touch(user_id, Platform::Telegram).await {
            warn!(user_id, error = %e, "failed to bump telegram last_sync");
        }

        Ok(Some(TelegramClientHandle {
            user_id: user_id.to_string(),
            session: Secret::new(secret),
        }))
    }

    /// Spawn the background sweeper that evicts pending logins past their
    /// TTL. Abandoned tasks observe the closed rendezvous and fail.
    pub fn spawn_login_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let logins = self.logins.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                let evicted = logins.evict_expired();
                if evicted > 0 {
                    info!(evicted, "evicted expired pending telegram logins");
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> &PendingLogins {
        &self.logins
    }
}

#[async_trait]
impl ChannelStatus for TelegramChannel {
    async fn connected(&self, user_id: &str) -> Result<bool> {
        match self.store.find_active(user_id, Platform::Telegram).await {
            Ok(session) => Ok(session.is_some()),
            Err(StoreError::InvalidCredential) => Ok(false),
            Err(e) => Err(ChannelError::external("session lookup failed", e)),
        }
    }

    /// Remove the persisted session. Succeeds when nothing was stored.
    async fn disconnect(&self, user_id: &str) -> Result<()> {
        self.store
            .remove(user_id, Platform::Telegram)
            .await
            .map_err(|e| ChannelError::external("session removal failed", e))?;
        info!(user_id, "telegram disconnected");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::login::LoginExchange,
        omnibox_vault::{KdfParams, SecretVault, kdf},
        sqlx::sqlite::SqlitePoolOptions,
    };

    /// Scripted stand-in for the real client library.
    struct FakeConnector {
        expected_code: String,
        /// `Some(pw)` simulates an account with 2FA enabled.
        expected_password: Option<String>,
        session: String,
        fail_with: Option<fn() -> ConnectorError>,
    }

    impl FakeConnector {
        fn plain(code: &str, session: &str) -> Self {
            Self {
                expected_code: code.into(),
                expected_password: None,
                session: session.into(),
                fail_with: None,
            }
        }

        fn with_2fa(code: &str, password: &str, session: &str) -> Self {
            Self {
                expected_password: Some(password.into()),
                ..Self::plain(code, session)
            }
        }
    }

    #[async_trait]
    impl TelegramConnector for FakeConnector {
        async fn sign_in(
            &self,
            phone: &str,
            mut exchange: LoginExchange,
        ) -> std::result::Result<String, ConnectorError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }

            // The network re-prompts on a wrong code; the attempt stays
            // open within the same window.
            loop {
                let code = exchange.await_code().await.ok_or(ConnectorError::Abandoned)?;
                if code == self.expected_code {
                    break;
                }
                debug!(phone, "fake connector rejecting code");
            }

            if let Some(expected) = &self.expected_password {
                let password = exchange
                    .await_password()
                    .await
                    .ok_or(ConnectorError::Abandoned)?;
                if &password != expected {
                    return Err(ConnectorError::Rejected("bad 2FA password".into()));
                }
            }

            Ok(self.session.clone())
        }
    }

    async fn test_store() -> Arc<SessionStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SessionStore::run_migrations(&pool).await.unwrap();
        let params = KdfParams {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        };
        let vault =
            SecretVault::derive_with_params("tg-test-pass", &kdf::generate_salt(), &params)
                .unwrap();
        Arc::new(SessionStore::new(pool, Arc::new(vault)))
    }

    fn channel(store: Arc<SessionStore>, connector: FakeConnector) -> TelegramChannel {
        TelegramChannel::new(store, Arc::new(connector), &TelegramConfig::default())
    }

    /// Poll until `check` passes or the budget runs out. Status polling
    /// replaces fixed sleeps: the login task and the caller are decoupled.
    async fn wait_for<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn start_then_submit_authenticates() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-1"));

        assert_eq!(ch.start_login("u1", "+15550001"), LoginStart::CodeRequested);
        assert_eq!(
            ch.submit_code("+15550001", "12345", None).unwrap(),
            SubmitOutcome::CodeSubmitted
        );

        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;

        let session = store
            .find_active("u1", Platform::Telegram)
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_active);
        assert_eq!(session.secret.as_deref(), Some("sess-1"));

        // Terminal success discards the pending entry.
        wait_for(|| async { ch.pending().is_empty() }).await;
    }

    #[tokio::test]
    async fn submit_without_start_is_no_pending_login() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "s"));

        let err = ch.submit_code("+15550001", "12345", None).unwrap_err();
        assert!(matches!(err, ChannelError::NoPendingLogin { .. }));

        // No side effects.
        assert!(!ch.connected("u1").await.unwrap());
        assert!(ch.pending().is_empty());
    }

    #[tokio::test]
    async fn wrong_code_keeps_the_attempt_open() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-1"));

        ch.start_login("u1", "+15550001");
        ch.submit_code("+15550001", "99999", None).unwrap();

        // Attempt is still pending; a correct retry completes it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ch.login_stage("+15550001"), Some(LoginStage::CodeSent));

        ch.submit_code("+15550001", "12345", None).unwrap();
        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;
    }

    #[tokio::test]
    async fn two_factor_flow() {
        let store = test_store().await;
        let ch = channel(
            Arc::clone(&store),
            FakeConnector::with_2fa("12345", "hunter2", "sess-2fa"),
        );

        ch.start_login("u1", "+15550001");

        // Password before the network asks for it: rejected, state intact.
        let err = ch
            .submit_code("+15550001", "12345", Some("hunter2"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotAwaitingPassword { .. }));

        ch.submit_code("+15550001", "12345", None).unwrap();

        // The connector signals the second factor; the stage flips.
        wait_for(|| async { ch.login_stage("+15550001") == Some(LoginStage::AwaitingPassword) })
            .await;
        assert!(!ch.connected("u1").await.unwrap());

        ch.submit_code("+15550001", "12345", Some("hunter2")).unwrap();
        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;

        let session = store
            .find_active("u1", Platform::Telegram)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.secret.as_deref(), Some("sess-2fa"));
    }

    #[tokio::test]
    async fn network_failure_fails_the_attempt() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector {
            fail_with: Some(|| ConnectorError::Network("dc unreachable".into())),
            ..FakeConnector::plain("12345", "s")
        });

        ch.start_login("u1", "+15550001");
        wait_for(|| async { ch.pending().is_empty() }).await;
        assert!(!ch.connected("u1").await.unwrap());
    }

    #[tokio::test]
    async fn restarting_supersedes_previous_attempt() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-2"));

        ch.start_login("u1", "+15550001");
        ch.start_login("u1", "+15550001");
        assert_eq!(ch.pending().len(), 1);

        ch.submit_code("+15550001", "12345", None).unwrap();
        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;
    }

    #[tokio::test]
    async fn eviction_abandons_the_login() {
        let store = test_store().await;
        let config = TelegramConfig {
            login_ttl_secs: 0,
            ..Default::default()
        };
        let ch = TelegramChannel::new(
            Arc::clone(&store),
            Arc::new(FakeConnector::plain("12345", "s")),
            &config,
        );

        ch.start_login("u1", "+15550001");
        assert_eq!(ch.pending().evict_expired(), 1);

        wait_for(|| async { ch.pending().is_empty() }).await;
        assert!(!ch.connected("u1").await.unwrap());
        assert!(matches!(
            ch.submit_code("+15550001", "12345", None),
            Err(ChannelError::NoPendingLogin { .. })
        ));
    }

    #[tokio::test]
    async fn client_returns_session_string() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-9"));

        assert!(ch.client("u1").await.unwrap().is_none());

        ch.start_login("u1", "+15550001");
        ch.submit_code("+15550001", "12345", None).unwrap();
        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;

        let handle = ch.client("u1").await.unwrap().unwrap();
        assert_eq!(handle.user_id(), "u1");
        assert_eq!(handle.session_string(), "sess-9");
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let store = test_store().await;
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-1"));

        // Nothing stored yet: still success.
        ch.disconnect("u1").await.unwrap();

        ch.start_login("u1", "+15550001");
        ch.submit_code("+15550001", "12345", None).unwrap();
        wait_for(|| async { ch.connected("u1").await.unwrap() }).await;

        ch.disconnect("u1").await.unwrap();
        ch.disconnect("u1").await.unwrap();
        assert!(!ch.connected("u1").await.unwrap());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_activate() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SessionStore::run_migrations(&pool).await.unwrap();
        let params = KdfParams {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        };
        let vault =
            SecretVault::derive_with_params("tg-test-pass", &kdf::generate_salt(), &params)
                .unwrap();
        let store = Arc::new(SessionStore::new(pool.clone(), Arc::new(vault)));
        let ch = channel(Arc::clone(&store), FakeConnector::plain("12345", "sess-1"));

        ch.start_login("u1", "+15550001");

        // Storage dies before the code arrives.
        pool.close().await;

        ch.submit_code("+15550001", "12345", None).unwrap();

        // The attempt terminates (entry discarded) without activating,
        // and without panicking the task.
        wait_for(|| async { ch.pending().is_empty() }).await;
    }
}
