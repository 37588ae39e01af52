// src/core/rcon/client.rs

//! The RCON client: request/response correlation over a shared transport.

use super::ids::IdSource;
use super::protocol::{self, BROADCAST_IDENTIFIER};
use super::transport::{ConnectionState, Transport, TransportEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{info, warn};

/// Connection parameters for the game server's WebRCON endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Log every inbound message at info level.
    pub log_messages: bool,
    /// The identifier the server stamps on chat messages.
    pub chat_identifier: i32,
}

impl RconSettings {
    /// The endpoint URL. Credentials travel in the path; the server only
    /// speaks unencrypted WebSocket.
    pub fn url(&self) -> String {
        format!("ws://{}:{}/{}", self.host, self.port, self.password)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

type BroadcastListener = Arc<dyn Fn(&str) + Send + Sync>;

/// A registered request. `token` tells apart two requests that reused the
/// same identifier one after the other.
struct Pending {
    token: u64,
    reply: oneshot::Sender<String>,
}

#[derive(Default)]
struct DispatchState {
    pending: HashMap<i32, Pending>,
    listeners: Vec<BroadcastListener>,
    next_token: u64,
}

/// Routes inbound frames to waiting requests or broadcast listeners.
///
/// Runs on the transport's task. Pending requests and listeners share one
/// lock, which is never held across an await.
struct Dispatcher {
    endpoint: String,
    log_messages: bool,
    chat_identifier: i32,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Open => info!("RCON connected to {}", self.endpoint),
            TransportEvent::Close(reason) => {
                info!("RCON disconnected from {}: {}", self.endpoint, reason)
            }
            TransportEvent::Error(e) => {
                warn!("RCON connection to {} failed: {}", self.endpoint, e)
            }
            TransportEvent::Message(text) => self.dispatch(&text),
        }
    }

    fn dispatch(&self, text: &str) {
        if self.log_messages {
            info!("RCON message received: {}", text);
        }

        let message = match protocol::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed RCON message ({}): {}", e, text);
                return;
            }
        };

        if message.is_broadcast(self.chat_identifier) {
            // Listeners run on a snapshot so they may register further listeners.
            let listeners = self.state.lock().listeners.clone();
            for listener in &listeners {
                listener(text);
            }
            return;
        }

        let waiter = self.state.lock().pending.remove(&message.identifier);
        match waiter {
            Some(pending) => {
                // The receiver may have just timed out; that is fine.
                let _ = pending.reply.send(message.message);
            }
            None => warn!(
                "Dropping RCON response with unknown identifier {}",
                message.identifier
            ),
        }
    }
}

/// Removes a pending identifier when the waiting future completes or is
/// dropped, so a late reply is always treated as unknown. Leaves the slot
/// alone if a newer request has since claimed the same identifier.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    identifier: i32,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.dispatcher.state.lock();
        if state
            .pending
            .get(&self.identifier)
            .is_some_and(|pending| pending.token == self.token)
        {
            state.pending.remove(&self.identifier);
        }
    }
}

/// A client for the game server's remote console.
///
/// Absence of a connection is a normal operating condition: every call that
/// cannot be served returns an empty response instead of an error.
pub struct RconClient {
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdSource>,
    dispatcher: Arc<Dispatcher>,
}

impl RconClient {
    /// Starts connecting in the background and returns immediately.
    pub fn connect(
        settings: RconSettings,
        transport: Arc<dyn Transport>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            endpoint: settings.endpoint(),
            log_messages: settings.log_messages,
            chat_identifier: settings.chat_identifier,
            state: Mutex::new(DispatchState::default()),
        });

        let handler = dispatcher.clone();
        transport.start(
            settings.url(),
            Arc::new(move |event: TransportEvent| handler.handle_event(event)),
        );

        Self {
            transport,
            ids,
            dispatcher,
        }
    }

    /// Reflects wire-level state only.
    pub fn is_connected(&self) -> bool {
        self.transport.state() == ConnectionState::Open
    }

    /// Adds a handler for unsolicited messages. Handlers run in registration order.
    pub fn register_broadcast_listener<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.dispatcher.state.lock().listeners.push(Arc::new(listener));
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.state.lock().pending.len()
    }

    /// Sends a console command.
    ///
    /// A zero `timeout` sends without expecting a reply and returns at once.
    /// Otherwise the call waits for the matching reply for at most `timeout`.
    /// An empty string means "no usable answer" in every case.
    pub async fn send(&self, command: &str, timeout: Duration) -> String {
        if !self.is_connected() {
            return String::new();
        }

        if timeout.is_zero() {
            self.transmit(BROADCAST_IDENTIFIER, command).await;
            return String::new();
        }

        let (identifier, token, rx) = self.register_pending();
        let _guard = PendingGuard {
            dispatcher: &self.dispatcher,
            identifier,
            token,
        };

        if !self.transmit(identifier, command).await {
            return String::new();
        }

        match time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => String::new(),
            Err(_) => {
                warn!(
                    "RCON command '{}' (identifier {}) timed out after {:?}",
                    command, identifier, timeout
                );
                String::new()
            }
        }
    }

    /// Picks a fresh identifier and registers it, under a single lock acquisition.
    fn register_pending(&self) -> (i32, u64, oneshot::Receiver<String>) {
        let mut state = self.dispatcher.state.lock();
        let identifier = loop {
            let candidate = self.ids.next_id();
            if candidate != BROADCAST_IDENTIFIER
                && candidate != self.dispatcher.chat_identifier
                && !state.pending.contains_key(&candidate)
            {
                break candidate;
            }
        };
        let token = state.next_token;
        state.next_token = state.next_token.wrapping_add(1);
        let (reply, rx) = oneshot::channel();
        state.pending.insert(identifier, Pending { token, reply });
        (identifier, token, rx)
    }

    async fn transmit(&self, identifier: i32, command: &str) -> bool {
        let payload = match protocol::encode_command(identifier, command) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode RCON command '{}': {}", command, e);
                return false;
            }
        };
        match self.transport.send(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send RCON command '{}': {}", command, e);
                false
            }
        }
    }
}

impl Drop for RconClient {
    fn drop(&mut self) {
        self.transport.close();
    }
}
