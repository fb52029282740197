//! WhatsApp Web channel: QR handshake, ready/crash/recover state machine,
//! and session-profile teardown.

use std::{future::Future, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::sync::{RwLock, mpsc},
    tracing::{debug, info, warn},
};

use {
    omnibox_channels::{ChannelError, ChannelStatus, Result},
    omnibox_sessions::{ChannelSession, HistoryMessage, Platform, SessionStore},
};

use crate::{
    config::WhatsAppConfig,
    profile,
    surface::{BrowserAutomation, BrowserSession, ChatSummary, SurfaceEvent},
};

/// Event channel depth. QR rotations are seconds apart; this never backs
/// up in practice.
const EVENT_BUFFER: usize = 16;

/// Where the automation surface currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Uninitialized,
    Initializing,
    /// Waiting for the human to scan; carries the current QR payload.
    AwaitingScan { qr: String },
    Ready { phone_number: Option<String> },
    /// A crashed surface is being torn down and relaunched.
    Recovering,
    Disconnected,
}

impl ReadyState {
    fn label(&self) -> &'static str {
        match self {
            ReadyState::Uninitialized => "uninitialized",
            ReadyState::Initializing => "initializing",
            ReadyState::AwaitingScan { .. } => "awaiting_scan",
            ReadyState::Ready { .. } => "ready",
            ReadyState::Recovering => "recovering",
            ReadyState::Disconnected => "disconnected",
        }
    }
}

/// What a connect call reports back to the polling caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Ready,
    Qr(String),
    Initializing,
}

struct SurfaceHandle {
    state: ReadyState,
    session: Option<Box<dyn BrowserSession>>,
    /// User who initiated the current connect; persistence is done on
    /// their behalf.
    owner: Option<String>,
    /// Bumped on every (re)initialization and teardown so stale event
    /// loops and launch completions can tell they were superseded.
    epoch: u64,
    /// True while a recovery cycle is in flight. At most one runs at a
    /// time.
    recovering: bool,
}

struct Shared {
    store: Arc<SessionStore>,
    automation: Arc<dyn BrowserAutomation>,
    config: WhatsAppConfig,
    handle: RwLock<SurfaceHandle>,
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Browser-session channel. One live automation surface per process.
pub struct WhatsAppChannel {
    shared: Arc<Shared>,
}

impl WhatsAppChannel {
    pub fn new(
        store: Arc<SessionStore>,
        automation: Arc<dyn BrowserAutomation>,
        config: WhatsAppConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                automation,
                config,
                handle: RwLock::new(SurfaceHandle {
                    state: ReadyState::Uninitialized,
                    session: None,
                    owner: None,
                    epoch: 0,
                    recovering: false,
                }),
            }),
        }
    }

    /// Report the current handshake position, starting initialization if
    /// nothing is running.
    ///
    /// Idempotent: concurrent callers observe the same in-flight
    /// initialization rather than spawning surfaces of their own. Callers
    /// poll this until they get `Ready` or a QR to display.
    pub async fn connect(&self, user_id: &str) -> Result<ConnectOutcome> {
        let mut h = self.shared.handle.write().await;

        if h.recovering {
            return Ok(ConnectOutcome::Initializing);
        }

        match &h.state {
            ReadyState::Ready { .. } => {
                drop(h);
                if let Err(e) = self.shared.store.touch(user_id, Platform::WhatsApp).await {
                    warn!(user_id, error = %e, "failed to bump whatsapp last_sync");
                }
                Ok(ConnectOutcome::Ready)
            },
            ReadyState::AwaitingScan { qr } => Ok(ConnectOutcome::Qr(qr.clone())),
            ReadyState::Initializing | ReadyState::Recovering => Ok(ConnectOutcome::Initializing),
            ReadyState::Uninitialized | ReadyState::Disconnected => {
                begin_initialization(&self.shared, &mut h, user_id);
                Ok(ConnectOutcome::Initializing)
            },
        }
    }

    /// Current state snapshot (for the UI and for tests).
    pub async fn ready_state(&self) -> ReadyState {
        self.shared.handle.read().await.state.clone()
    }

    /// Send a text message. Requires `Ready`; any other state is
    /// `NotConnected`, a recoverable condition the caller surfaces as
    /// "please reconnect".
    pub async fn send_text(&self, user_id: &str, chat_id: &str, text: &str) -> Result<String> {
        let send_result = {
            let h = self.shared.handle.read().await;
            if !matches!(h.state, ReadyState::Ready { .. }) {
                return Err(ChannelError::NotConnected);
            }
            let Some(session) = h.session.as_ref() else {
                return Err(ChannelError::NotConnected);
            };
            session.send_text(chat_id, text).await
        };

        match send_result {
            Ok(message_id) => {
                if let Err(e) = self.shared.store.touch(user_id, Platform::WhatsApp).await {
                    warn!(user_id, error = %e, "failed to bump whatsapp last_sync");
                }
                let message = HistoryMessage {
                    message_id: message_id.clone(),
                    from: "me".into(),
                    to: chat_id.into(),
                    text: text.into(),
                    timestamp: now_epoch(),
                    status: "sent".into(),
                };
                if let Err(e) = self
                    .shared
                    .store
                    .append_message(user_id, Platform::WhatsApp, chat_id, None, message)
                    .await
                {
                    warn!(user_id, chat_id, error = %e, "failed to append message history");
                }
                Ok(message_id)
            },
            Err(e) if e.is_surface_dead() => {
                handle_surface_death(&self.shared, &e.to_string()).await;
                Err(ChannelError::automation_failure(e.to_string()))
            },
            Err(e) => Err(ChannelError::external("message send failed", e)),
        }
    }

    /// List chats on the surface. Requires `Ready`.
    pub async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        let list_result = {
            let h = self.shared.handle.read().await;
            if !matches!(h.state, ReadyState::Ready { .. }) {
                return Err(ChannelError::NotConnected);
            }
            let Some(session) = h.session.as_ref() else {
                return Err(ChannelError::NotConnected);
            };
            session.list_chats().await
        };

        match list_result {
            Ok(chats) => {
                if let Err(e) = self.shared.store.touch(user_id, Platform::WhatsApp).await {
                    warn!(user_id, error = %e, "failed to bump whatsapp last_sync");
                }
                Ok(chats)
            },
            Err(e) if e.is_surface_dead() => {
                handle_surface_death(&self.shared, &e.to_string()).await;
                Err(ChannelError::automation_failure(e.to_string()))
            },
            Err(e) => Err(ChannelError::external("chat listing failed", e)),
        }
    }
}

#[async_trait]
impl ChannelStatus for WhatsAppChannel {
    async fn connected(&self, user_id: &str) -> Result<bool> {
        let h = self.shared.handle.read().await;
        Ok(matches!(h.state, ReadyState::Ready { .. }) && h.owner.as_deref() == Some(user_id))
    }

    /// Graceful logout, force-terminate, wipe the on-disk profile with
    /// bounded retries, drop the persisted record. Idempotent.
    async fn disconnect(&self, user_id: &str) -> Result<()> {
        let session = {
            let mut h = self.shared.handle.write().await;
            h.epoch += 1;
            h.recovering = false;
            h.owner = None;
            h.state = ReadyState::Disconnected;
            h.session.take()
        };

        if let Some(session) = session {
            if let Err(e) = session.logout().await {
                debug!(user_id, error = %e, "graceful logout failed");
            }
            if let Err(e) = session.terminate().await {
                debug!(user_id, error = %e, "surface terminate failed");
            }
        }

        profile::purge_profile_dir(
            &self.shared.config.profile_dir,
            self.shared.config.purge_attempts,
            Duration::from_millis(self.shared.config.purge_retry_delay_ms),
        )
        .await;

        self.shared
            .store
            .remove(user_id, Platform::WhatsApp)
            .await
            .map_err(|e| ChannelError::external("session removal failed", e))?;

        info!(user_id, "whatsapp disconnected");
        Ok(())
    }
}

/// Start the surface. Caller holds the write lock and has verified no
/// initialization is running.
fn begin_initialization(shared: &Arc<Shared>, h: &mut SurfaceHandle, user_id: &str) {
    h.state = ReadyState::Initializing;
    h.owner = Some(user_id.to_string());
    h.epoch += 1;
    let epoch = h.epoch;

    info!(user_id, "initializing whatsapp surface");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let launch_shared = Arc::clone(shared);
    let loop_shared = Arc::clone(shared);

    tokio::spawn(async move {
        let profile_dir = launch_shared.config.profile_dir.clone();
        match launch_shared.automation.launch(&profile_dir, tx).await {
            Ok(session) => {
                let mut h = launch_shared.handle.write().await;
                if h.epoch == epoch {
                    h.session = Some(session);
                } else {
                    // Superseded while launching; kill the orphan.
                    drop(h);
                    let _ = session.terminate().await;
                }
            },
            Err(e) => {
                warn!(error = %e, "whatsapp surface launch failed");
                let mut h = launch_shared.handle.write().await;
                if h.epoch == epoch {
                    h.state = ReadyState::Disconnected;
                    h.recovering = false;
                }
            },
        }
    });

    tokio::spawn(run_event_loop(loop_shared, rx, epoch));
}

/// Consume surface events for one initialization epoch.
async fn run_event_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<SurfaceEvent>, epoch: u64) {
    while let Some(event) = rx.recv().await {
        match event {
            SurfaceEvent::Qr(qr) => {
                let mut h = shared.handle.write().await;
                if h.epoch != epoch {
                    break;
                }
                debug!("whatsapp qr payload received");
                h.state = ReadyState::AwaitingScan { qr };
            },
            SurfaceEvent::Ready { phone_number } => {
                let owner = {
                    let mut h = shared.handle.write().await;
                    if h.epoch != epoch {
                        break;
                    }
                    h.state = ReadyState::Ready {
                        phone_number: phone_number.clone(),
                    };
                    h.owner.clone()
                };

                let Some(owner) = owner else { continue };
                // A ready session that cannot be durably recorded is not
                // presented as connected.
                let record = ChannelSession::active(&owner, Platform::WhatsApp, None);
                if let Err(e) = shared.store.upsert(&record).await {
                    warn!(owner, error = %e, "whatsapp session persistence failed");
                    let mut h = shared.handle.write().await;
                    if h.epoch == epoch {
                        h.state = ReadyState::Disconnected;
                    }
                } else {
                    info!(owner, ?phone_number, "whatsapp session ready");
                }
            },
            SurfaceEvent::AuthFailure(reason) => {
                warn!(reason, "whatsapp authentication failed");
                let session = {
                    let mut h = shared.handle.write().await;
                    if h.epoch != epoch {
                        break;
                    }
                    h.state = ReadyState::Disconnected;
                    h.session.take()
                };
                if let Some(session) = session {
                    tokio::spawn(async move {
                        let _ = session.terminate().await;
                    });
                }
            },
            SurfaceEvent::ConnectionLost(reason) => {
                handle_surface_death(&shared, &reason).await;
            },
        }
    }
    debug!(epoch, "whatsapp event loop ended");
}

/// React to a dead surface detected while `Ready`.
///
/// Fails fast for in-flight callers (state leaves `Ready` immediately),
/// then a watchdog tears the surface down and relaunches after a short
/// fixed delay. The `recovering` flag guarantees a single cycle at a
/// time; detection from any other state is a no-op.
async fn handle_surface_death(shared: &Arc<Shared>, reason: &str) {
    let old_session = {
        let mut h = shared.handle.write().await;
        if h.recovering || !matches!(h.state, ReadyState::Ready { .. }) {
            debug!(state = h.state.label(), "ignoring surface death signal");
            return;
        }
        h.recovering = true;
        h.state = ReadyState::Disconnected;
        h.epoch += 1;
        h.session.take()
    };

    warn!(reason, "whatsapp surface died, scheduling recovery");

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        if let Some(session) = old_session {
            let _ = session.terminate().await;
        }

        {
            let mut h = shared.handle.write().await;
            // Disconnect may have raced in; it clears the flag.
            if !h.recovering {
                return;
            }
            h.state = ReadyState::Recovering;
        }

        tokio::time::sleep(Duration::from_millis(shared.config.recovery_delay_ms)).await;

        let mut h = shared.handle.write().await;
        if !h.recovering {
            return;
        }
        h.recovering = false;
        match h.owner.clone() {
            Some(owner) if matches!(h.state, ReadyState::Recovering) => {
                info!(owner, "relaunching whatsapp surface after crash");
                begin_initialization(&shared, &mut h, &owner);
            },
            _ => {
                h.state = ReadyState::Disconnected;
            },
        }
    });
}
