//! OAuth mail channel.
//!
//! Token acquisition via the authorization-code flow, silent refresh on
//! expiry, and revocation. The persisted state machine is
//! `Unauthenticated → AuthorizationRedirected → TokenObtained →
//! TokenRefreshing → TokenObtained | RevokedOrExpired`; there is no
//! long-lived in-memory credential, only the encrypted record in the
//! session store plus expiry arithmetic.

pub mod channel;
pub mod config;
pub mod flow;
pub mod tokens;

pub use {
    channel::{MailChannel, MailClient},
    config::MailOauthConfig,
    flow::AuthCodeFlow,
    tokens::TokenSet,
};
