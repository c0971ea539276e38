use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Transport-assigned identity of one logical connection.
///
/// Ids come from a process-wide counter and are never reused, so an id that
/// has been closed can never name a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Packets sent by a client.
///
/// Every packet is a single JSON object followed by a newline character (\n):
/// `{"type": "join", "payload": {"username": "Alice"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientPacket {
    Join(JoinPayload),
    SendMessage(ChatMessage),
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerPacket {
    /// Human-readable join/leave announcement, broadcast.
    JoinedPersonName(String),
    /// Welcome snapshot of active names, sent only to the joining connection.
    ActiveUsers(Vec<String>),
    /// Full list of active names after a presence change, broadcast.
    UpdateUserList(Vec<String>),
    /// A chat line, broadcast to everyone including its sender.
    ReceiveMessage(ChatMessage),
}

impl ServerPacket {
    pub fn joined(name: &str) -> Self {
        Self::JoinedPersonName(format!("{name} has joined the chat."))
    }

    pub fn left(name: &str) -> Self {
        Self::JoinedPersonName(format!("{name} has disconnected"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPayload {
    pub username: String,
}

/// An ephemeral chat line. Never stored: broadcast once and dropped.
///
/// On inbound `sendMessage` packets the sender field is informational only;
/// the server replaces it with the name stored for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "username", default)]
    pub sender_name: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
            text: text.into(),
        }
    }
}

/// Serialises `value` as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut data = serde_json::to_vec(value).map_err(ProtocolError::Encode)?;
    data.push(b'\n');
    Ok(data)
}

/// Parses one JSON line; surrounding whitespace (including `\r`) is ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(line.trim()).map_err(ProtocolError::Decode)
}
