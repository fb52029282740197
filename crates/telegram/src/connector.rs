use async_trait::async_trait;

use crate::login::LoginExchange;

/// Errors a connector can terminate a sign-in with.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The rendezvous closed before input arrived — the pending login was
    /// evicted or superseded by a newer attempt for the same phone.
    #[error("login abandoned before input arrived")]
    Abandoned,

    /// The network rejected the attempt terminally (e.g. wrong 2FA
    /// password). The caller must restart from the beginning.
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    /// Transport failure; the whole attempt is dead.
    #[error("network error: {0}")]
    Network(String),
}

/// Seam to the real Telegram client library.
///
/// `sign_in` mirrors the library's blocking login call: it requests a
/// code for `phone` and then suspends on `exchange` until the code — and,
/// when the account has a second factor, the password — is supplied from
/// outside. On success it returns the serialized session string to
/// persist. Implementations call [`LoginExchange::await_code`] again
/// after an invalid code, keeping the attempt open for a retry.
#[async_trait]
pub trait TelegramConnector: Send + Sync {
    async fn sign_in(
        &self,
        phone: &str,
        exchange: LoginExchange,
    ) -> Result<String, ConnectorError>;
}
