//! Seam to the browser automation library.

use std::path::Path;

use {async_trait::async_trait, tokio::sync::mpsc};

/// Errors from the automation surface.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The underlying execution context is gone — the browser or its page
    /// crashed. This is the signature the channel keys crash recovery on.
    #[error("execution context closed: {0}")]
    ContextClosed(String),

    /// Launching the surface failed outright.
    #[error("surface launch failed: {0}")]
    Launch(String),

    /// An ordinary operation failure on a live surface.
    #[error("surface operation failed: {0}")]
    Operation(String),
}

impl SurfaceError {
    /// Whether this error means the surface itself is dead (as opposed to
    /// one failed operation).
    #[must_use]
    pub fn is_surface_dead(&self) -> bool {
        matches!(self, SurfaceError::ContextClosed(_))
    }
}

/// Out-of-band notifications from a launched surface.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// A fresh scannable QR payload (rotates until scanned).
    Qr(String),
    /// The handshake completed; the session is usable.
    Ready { phone_number: Option<String> },
    /// The stored profile was rejected; a new QR handshake is required.
    AuthFailure(String),
    /// The surface lost its session or crashed.
    ConnectionLost(String),
}

/// One chat as listed by the surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatSummary {
    pub chat_id: String,
    pub name: String,
    pub unread_count: u32,
}

/// Launches automation surfaces. One live surface per process.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Start the surface against `profile_dir`, delivering lifecycle
    /// notifications through `events`. Returns quickly; the QR/ready
    /// handshake continues via the event stream.
    async fn launch(
        &self,
        profile_dir: &Path,
        events: mpsc::Sender<SurfaceEvent>,
    ) -> Result<Box<dyn BrowserSession>, SurfaceError>;
}

/// Operations on a launched surface.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Invalidate the remote session (best effort).
    async fn logout(&self) -> Result<(), SurfaceError>;

    /// Kill the underlying browser process.
    async fn terminate(&self) -> Result<(), SurfaceError>;

    /// Send a text message; returns the message id.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, SurfaceError>;

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SurfaceError>;
}
