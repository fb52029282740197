//! Persisted channel sessions.
//!
//! One record per `{user_id, platform}` holding the encrypted platform
//! secret, the active flag, and the last-sync timestamp. Encryption and
//! decryption happen at the store boundary — everything above this crate
//! speaks plaintext secrets.

pub mod error;
pub mod platform;
pub mod record;
pub mod store;

pub use {
    error::StoreError,
    platform::Platform,
    record::{ChannelSession, ConversationSummary, HistoryMessage},
    store::SessionStore,
};
