//! Interactive-login channel for the Telegram network.
//!
//! The network's code-request call does not return until a code is
//! submitted, so a login runs as its own task that suspends on a
//! rendezvous ([`login::LoginExchange`]) until the human relays the code
//! (and, for 2FA accounts, a password) through a second HTTP call. The
//! state machine rejects out-of-order submissions explicitly.

pub mod channel;
pub mod config;
pub mod connector;
pub mod login;

pub use {
    channel::{LoginStart, TelegramChannel, TelegramClientHandle},
    config::TelegramConfig,
    connector::{ConnectorError, TelegramConnector},
    login::{LoginExchange, LoginStage, PendingLogins, SubmitOutcome},
};
