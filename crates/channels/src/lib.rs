//! Shared contract for channel session subsystems.
//!
//! Each platform channel (mail, Telegram, WhatsApp Web) drives its own
//! authentication state machine but exposes the same narrow
//! [`ChannelStatus`] surface, which the session manager consumes. The
//! error taxonomy here is the only failure vocabulary that crosses the
//! channel boundary.

pub mod error;
pub mod status;

pub use {
    error::{ChannelError, Result},
    status::ChannelStatus,
};
