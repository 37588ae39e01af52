// src/core/rcon/mod.rs

//! WebRCON: a persistent console connection to the supervised game server.

pub mod client;
pub mod ids;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use client::{RconClient, RconSettings};
pub use ids::{IdSource, RandomIds};
pub use transport::{ConnectionState, EventHandler, Transport, TransportEvent};
pub use websocket::WebSocketTransport;
