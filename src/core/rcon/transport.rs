// src/core/rcon/transport.rs

//! The transport seam between the RCON protocol logic and the socket.

use crate::core::errors::LaunchSiteError;
use async_trait::async_trait;
use std::sync::Arc;

/// Wire-level connection state as reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Events a transport reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close(String),
    Error(String),
}

/// Callback invoked by the transport on its own task for every event.
pub type EventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// A persistent, self-reconnecting message channel to the RCON endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins connecting in the background. Returns immediately.
    fn start(&self, url: String, on_event: EventHandler);

    fn state(&self) -> ConnectionState;

    /// Queues one text frame for transmission.
    async fn send(&self, payload: String) -> Result<(), LaunchSiteError>;

    /// Stops reconnecting and tears down any open connection.
    fn close(&self);
}
