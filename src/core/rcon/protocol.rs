// src/core/rcon/protocol.rs

//! The WebRCON JSON message shapes.
//!
//! Every frame on the wire is a single JSON text message. Outbound commands
//! carry a caller-chosen `Identifier` that the server echoes back on the
//! matching reply. Identifier `0` means "no reply expected" outbound and
//! "broadcast" inbound.

use crate::core::errors::LaunchSiteError;
use serde::{Deserialize, Serialize};

/// The sender tag attached to every outbound command.
pub const SENDER_TAG: &str = "WebRcon";

/// The identifier reserved for fire-and-forget commands and broadcasts.
pub const BROADCAST_IDENTIFIER: i32 = 0;

/// The `Type` value the server uses to tag chat messages.
pub const CHAT_TYPE: &str = "Chat";

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundMessage<'a> {
    pub identifier: i32,
    pub message: &'a str,
    pub name: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct InboundMessage {
    pub identifier: i32,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "Type", default)]
    pub kind: Option<String>,
}

impl InboundMessage {
    /// Returns true if this message was not solicited by a command.
    ///
    /// The server tags chat with a dedicated identifier rather than zero, so
    /// `chat_identifier` is treated as a broadcast marker as well.
    pub fn is_broadcast(&self, chat_identifier: i32) -> bool {
        self.identifier == BROADCAST_IDENTIFIER
            || self.identifier == chat_identifier
            || self.kind.as_deref() == Some(CHAT_TYPE)
    }
}

/// Serializes a console command for transmission.
pub fn encode_command(identifier: i32, command: &str) -> Result<String, LaunchSiteError> {
    let message = OutboundMessage {
        identifier,
        message: command,
        name: SENDER_TAG,
    };
    Ok(serde_json::to_string(&message)?)
}

/// Parses one inbound text frame.
pub fn decode(text: &str) -> Result<InboundMessage, LaunchSiteError> {
    Ok(serde_json::from_str(text)?)
}
