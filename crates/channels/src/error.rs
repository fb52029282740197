use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Failure vocabulary shared by every channel.
///
/// Channel-internal errors are translated into one of these before they
/// reach the session manager; callers only ever see "not connected" or
/// "please retry" shapes derived from this taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No authenticated session for this user — prompt a reconnect.
    #[error("channel not connected")]
    NotConnected,

    /// A stored secret failed to decrypt or verify. Force
    /// re-authentication; never treat as fatal.
    #[error("stored credential is invalid, re-authentication required")]
    InvalidCredential,

    /// A code/password was submitted with no login in flight for that key.
    #[error("no pending login for {key}")]
    NoPendingLogin { key: String },

    /// A password was submitted before the network asked for one.
    #[error("login for {key} is not awaiting a password")]
    NotAwaitingPassword { key: String },

    /// The browser automation surface died mid-operation. Recovery is
    /// automatic; callers see this as a temporary disconnect.
    #[error("automation surface failure: {message}")]
    TransientAutomationFailure { message: String },

    /// The provider rejected the credentials (bad code, revoked grant).
    #[error("provider rejected the request: {message}")]
    UpstreamRejected { message: String },

    /// Durable storage failed during an otherwise-successful login. Fatal
    /// for the attempt: a session that could not be stored is not active.
    #[error("session persistence failed: {message}")]
    Persistence { message: String },

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ChannelError {
    #[must_use]
    pub fn no_pending_login(key: impl std::fmt::Display) -> Self {
        Self::NoPendingLogin {
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn not_awaiting_password(key: impl std::fmt::Display) -> Self {
        Self::NotAwaitingPassword {
            key: key.to_string(),
        }
    }

    #[must_use]
    pub fn automation_failure(message: impl std::fmt::Display) -> Self {
        Self::TransientAutomationFailure {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn upstream_rejected(message: impl std::fmt::Display) -> Self {
        Self::UpstreamRejected {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn persistence(message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the caller can recover by reconnecting (as opposed to a
    /// protocol violation or an internal failure).
    #[must_use]
    pub fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::InvalidCredential | Self::TransientAutomationFailure { .. }
        )
    }
}
