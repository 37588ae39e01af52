// src/core/rcon/websocket.rs

//! A `Transport` backed by `tokio-tungstenite`.
//!
//! The transport owns a background task that connects, pumps frames in both
//! directions, and reconnects with exponential backoff whenever the
//! connection drops. It never sends heartbeat pings of its own; the game
//! server drops connections that do.

use super::transport::{ConnectionState, EventHandler, Transport, TransportEvent};
use crate::core::errors::LaunchSiteError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

struct Shared {
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    cancel: CancellationToken,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn start(&self, url: String, on_event: EventHandler) {
        let shared = self.shared.clone();
        tokio::spawn(run_connection_loop(shared, url, on_event));
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    async fn send(&self, payload: String) -> Result<(), LaunchSiteError> {
        let sender = self.shared.outbound.lock().clone();
        match sender {
            Some(tx) => tx
                .send(payload)
                .map_err(|_| LaunchSiteError::Transport("connection closed".to_string())),
            None => Err(LaunchSiteError::Transport("not connected".to_string())),
        }
    }

    fn close(&self) {
        self.shared.cancel.cancel();
        self.shared.outbound.lock().take();
    }
}

/// Connects, pumps, and reconnects until the transport is closed.
async fn run_connection_loop(shared: Arc<Shared>, url: String, on_event: EventHandler) {
    let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let attempt = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match attempt {
            Ok((stream, _)) => {
                reconnect_delay = INITIAL_RECONNECT_DELAY; // Reset delay on success.
                let (tx, rx) = mpsc::unbounded_channel();
                *shared.outbound.lock() = Some(tx);
                shared.set_state(ConnectionState::Open);
                on_event(TransportEvent::Open);

                let reason = pump_frames(stream, rx, &shared.cancel, &on_event).await;

                shared.outbound.lock().take();
                shared.set_state(ConnectionState::Disconnected);
                on_event(TransportEvent::Close(reason));
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                on_event(TransportEvent::Error(e.to_string()));
            }
        }

        if shared.cancel.is_cancelled() {
            break;
        }

        debug!("RCON reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = time::sleep(reconnect_delay) => {}
        }
        // Apply exponential backoff for subsequent reconnection attempts.
        reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Moves frames between the socket and the owner until the connection ends.
/// Returns a human-readable close reason.
async fn pump_frames(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
    on_event: &EventHandler,
) -> String {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    warn!("Failed to send RCON close frame: {}", e);
                }
                return "closed locally".to_string();
            }
            next = outbound.recv() => match next {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        return format!("write failed: {e}");
                    }
                }
                None => return "outbound channel closed".to_string(),
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => on_event(TransportEvent::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    return frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by peer".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("read failed: {e}"),
                None => return "stream ended".to_string(),
            },
        }
    }
}
