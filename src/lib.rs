//! Multiplayer snake state sync: an authoritative websocket room server and a
//! client-side connection manager with a local simulation fallback.

pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod protocol;
pub mod transport;
