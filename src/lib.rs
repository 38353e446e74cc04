//! Skirmish Server Library
//!
//! Authoritative real-time server for a top-down multiplayer shooter,
//! served over WebTransport.
//!
//! # Features
//!
//! - `registration` - Register with the web API directory and send player-count heartbeats (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
pub mod util;

#[cfg(feature = "registration")]
pub mod registration;
