//! In-memory pending-login registry and the code/password rendezvous.
//!
//! Each in-flight login owns a [`LoginExchange`] the connector suspends
//! on; the registry holds the sending halves, keyed by phone number.
//! Entries are never persisted and are discarded on any terminal outcome
//! or when their TTL lapses.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {tokio::sync::mpsc, tracing::debug};

use omnibox_channels::{ChannelError, Result};

/// Where a pending login currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// The network has been asked for a code; waiting for the human.
    CodeSent,
    /// The code was accepted but the account has a second factor.
    AwaitingPassword,
}

/// What a successful submission delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    CodeSubmitted,
    PasswordSubmitted,
}

struct PendingEntry {
    user_id: String,
    attempt_id: u64,
    stage: LoginStage,
    code_tx: mpsc::Sender<String>,
    password_tx: mpsc::Sender<String>,
    created_at: Instant,
}

/// Registry of in-flight logins, keyed by phone number.
///
/// Cheap to clone; all clones share one map. Lookups are synchronous and
/// the lock is never held across an await point.
#[derive(Clone)]
pub struct PendingLogins {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
    next_attempt: Arc<AtomicU64>,
    ttl: Duration,
}

impl PendingLogins {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_attempt: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    /// Register a new pending login and hand back the rendezvous for the
    /// connector. An existing entry for the same phone is replaced — its
    /// senders drop, which the superseded login task observes as
    /// abandonment.
    pub fn register(&self, user_id: &str, phone: &str) -> LoginExchange {
        let (code_tx, code_rx) = mpsc::channel(1);
        let (password_tx, password_rx) = mpsc::channel(1);
        let attempt_id = self.next_attempt.fetch_add(1, Ordering::Relaxed);

        let entry = PendingEntry {
            user_id: user_id.to_string(),
            attempt_id,
            stage: LoginStage::CodeSent,
            code_tx,
            password_tx,
            created_at: Instant::now(),
        };

        let mut entries = lock(&self.entries);
        if entries.insert(phone.to_string(), entry).is_some() {
            debug!(phone, "superseding pending login for phone");
        }

        LoginExchange {
            phone: phone.to_string(),
            attempt_id,
            logins: self.clone(),
            code_rx,
            password_rx,
        }
    }

    /// Deliver a code (and optionally a password) into the pending login
    /// for `phone`.
    ///
    /// Protocol violations are rejected without touching the state
    /// machine: no entry → `NoPendingLogin`; a password supplied before
    /// the network asked for one → `NotAwaitingPassword`.
    pub fn submit(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<SubmitOutcome> {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get(phone) else {
            return Err(ChannelError::no_pending_login(phone));
        };

        if password.is_some() && entry.stage != LoginStage::AwaitingPassword {
            return Err(ChannelError::not_awaiting_password(phone));
        }

        // A closed channel means the login task already terminated; the
        // entry is stale and about to be discarded.
        if entry.code_tx.try_send(code.to_string()).is_err() && entry.code_tx.is_closed() {
            entries.remove(phone);
            return Err(ChannelError::no_pending_login(phone));
        }

        if let Some(password) = password {
            let _ = entry.password_tx.try_send(password.to_string());
            return Ok(SubmitOutcome::PasswordSubmitted);
        }

        Ok(SubmitOutcome::CodeSubmitted)
    }

    /// Current stage of the pending login for `phone`, if any.
    pub fn stage(&self, phone: &str) -> Option<LoginStage> {
        lock(&self.entries).get(phone).map(|e| e.stage)
    }

    /// Owner of the pending login for `phone`, if any.
    pub fn owner(&self, phone: &str) -> Option<String> {
        lock(&self.entries).get(phone).map(|e| e.user_id.clone())
    }

    /// Number of pending logins (for eviction telemetry and tests).
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries older than the TTL. Their login tasks observe the
    /// closed rendezvous and fail the attempt. Returns how many were
    /// evicted.
    pub fn evict_expired(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.created_at.elapsed() < ttl);
        before - entries.len()
    }

    fn mark_awaiting_password(&self, phone: &str, attempt_id: u64) {
        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(phone)
            && entry.attempt_id == attempt_id
        {
            entry.stage = LoginStage::AwaitingPassword;
        }
    }

    /// Remove the entry for `phone` if it still belongs to `attempt_id`.
    /// Guarded so a superseded task cannot discard its successor's entry.
    pub(crate) fn discard(&self, phone: &str, attempt_id: u64) {
        let mut entries = lock(&self.entries);
        if entries.get(phone).is_some_and(|e| e.attempt_id == attempt_id) {
            entries.remove(phone);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Lock poisoning would require a panic while holding the lock; the
    // critical sections here cannot panic, and recovering keeps every
    // other login usable.
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The connector side of the rendezvous for one login attempt.
pub struct LoginExchange {
    phone: String,
    attempt_id: u64,
    logins: PendingLogins,
    code_rx: mpsc::Receiver<String>,
    password_rx: mpsc::Receiver<String>,
}

impl LoginExchange {
    /// Suspend until a code arrives. `None` means the login was abandoned
    /// (evicted or superseded). May be called again after the network
    /// rejects a code — the attempt stays open for a retry.
    pub async fn await_code(&mut self) -> Option<String> {
        self.code_rx.recv().await
    }

    /// Signal that the account needs its second factor, then suspend
    /// until the password arrives. The stage flip is what lets
    /// `submit_code` accept a password from this point on.
    pub async fn await_password(&mut self) -> Option<String> {
        self.logins
            .mark_awaiting_password(&self.phone, self.attempt_id);
        self.password_rx.recv().await
    }

    pub(crate) fn attempt_id(&self) -> u64 {
        self.attempt_id
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn logins() -> PendingLogins {
        PendingLogins::new(Duration::from_secs(600))
    }

    #[tokio::test]
    async fn submit_without_pending_login_is_rejected() {
        let logins = logins();
        let err = logins.submit("+15550001", "12345", None).unwrap_err();
        assert!(matches!(err, ChannelError::NoPendingLogin { .. }));
        assert!(logins.is_empty());
    }

    #[tokio::test]
    async fn code_reaches_the_exchange() {
        let logins = logins();
        let mut exchange = logins.register("u1", "+15550001");

        assert_eq!(
            logins.submit("+15550001", "12345", None).unwrap(),
            SubmitOutcome::CodeSubmitted
        );
        assert_eq!(exchange.await_code().await.as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn password_before_required_is_rejected() {
        let logins = logins();
        let _exchange = logins.register("u1", "+15550001");

        let err = logins
            .submit("+15550001", "12345", Some("hunter2"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotAwaitingPassword { .. }));

        // The rejected call left the state machine untouched.
        assert_eq!(logins.stage("+15550001"), Some(LoginStage::CodeSent));
    }

    #[tokio::test]
    async fn await_password_flips_the_stage() {
        let logins = logins();
        let mut exchange = logins.register("u1", "+15550001");

        logins.submit("+15550001", "12345", None).unwrap();
        exchange.await_code().await.unwrap();

        let flip = tokio::spawn(async move { exchange.await_password().await });
        // Wait for the stage flip to become visible.
        for _ in 0..100 {
            if logins.stage("+15550001") == Some(LoginStage::AwaitingPassword) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(logins.stage("+15550001"), Some(LoginStage::AwaitingPassword));

        assert_eq!(
            logins.submit("+15550001", "12345", Some("hunter2")).unwrap(),
            SubmitOutcome::PasswordSubmitted
        );
        assert_eq!(flip.await.unwrap().as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn register_overwrites_previous_attempt() {
        let logins = logins();
        let mut first = logins.register("u1", "+15550001");
        let _second = logins.register("u1", "+15550001");

        // The superseded exchange observes abandonment.
        assert!(first.await_code().await.is_none());
        assert_eq!(logins.len(), 1);
    }

    #[tokio::test]
    async fn discard_is_attempt_scoped() {
        let logins = logins();
        let first = logins.register("u1", "+15550001");
        let first_attempt = first.attempt_id();
        let _second = logins.register("u1", "+15550001");

        // The old task discarding must not remove the new entry.
        logins.discard("+15550001", first_attempt);
        assert_eq!(logins.len(), 1);
    }

    #[tokio::test]
    async fn eviction_drops_stale_entries_and_abandons_the_task() {
        let logins = PendingLogins::new(Duration::from_millis(0));
        let mut exchange = logins.register("u1", "+15550001");

        assert_eq!(logins.evict_expired(), 1);
        assert!(logins.is_empty());
        assert!(exchange.await_code().await.is_none());
    }

    #[tokio::test]
    async fn eviction_keeps_fresh_entries() {
        let logins = logins();
        let _exchange = logins.register("u1", "+15550001");
        assert_eq!(logins.evict_expired(), 0);
        assert_eq!(logins.len(), 1);
    }

    #[tokio::test]
    async fn owner_is_tracked() {
        let logins = logins();
        let _exchange = logins.register("u7", "+15550001");
        assert_eq!(logins.owner("+15550001").as_deref(), Some("u7"));
        assert!(logins.owner("+19990000").is_none());
    }
}
