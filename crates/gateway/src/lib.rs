//! Channel session manager.
//!
//! The façade the rest of the application consumes: a uniform
//! status/disconnect contract over the three channels plus
//! platform-specific start/verify pass-throughs. Channels are injected as
//! owned dependencies — there is no ambient global client state.

pub mod manager;

pub use manager::ChannelSessionManager;
