//! Browser-session channel for WhatsApp Web.
//!
//! The session lives inside a headless-browser automation surface: a QR
//! handshake authenticates it, the on-disk profile directory persists it,
//! and a watchdog re-enters the state machine when the surface crashes.
//! The surface is a single shared long-lived resource per process.

pub mod channel;
pub mod config;
pub mod profile;
pub mod surface;

pub use {
    channel::{ConnectOutcome, ReadyState, WhatsAppChannel},
    config::WhatsAppConfig,
    surface::{BrowserAutomation, BrowserSession, ChatSummary, SurfaceError, SurfaceEvent},
};
