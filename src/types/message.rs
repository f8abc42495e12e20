//! Message and socket event types flowing from sockets to subscribers

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::ProtocolName;

/// A message exactly as it crossed the wire.
///
/// Both variants share their buffer, so fanning a message out to many
/// subscribers never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    /// UTF-8 text frame
    Text(Arc<str>),
    /// Binary frame (camera images)
    Binary(Arc<[u8]>),
}

impl RawMessage {
    /// Text content, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawMessage::Text(text) => Some(text),
            RawMessage::Binary(_) => None,
        }
    }

    /// Raw bytes of either variant.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawMessage::Text(text) => text.as_bytes(),
            RawMessage::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Decode the message as JSON.
    pub fn decode_json(&self) -> serde_json::Result<Value> {
        match self {
            RawMessage::Text(text) => serde_json::from_str(text),
            RawMessage::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        RawMessage::Text(Arc::from(text))
    }
}

impl From<String> for RawMessage {
    fn from(text: String) -> Self {
        RawMessage::Text(Arc::from(text))
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(bytes: Vec<u8>) -> Self {
        RawMessage::Binary(Arc::from(bytes))
    }
}

/// What a subscriber receives for one incoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Decoded once per message and shared by every JSON subscriber
    Json(Arc<Value>),
    /// Delivered unchanged to subscribers that opted out of JSON decoding
    Raw(RawMessage),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawMessage> {
        match self {
            Payload::Json(_) => None,
            Payload::Raw(message) => Some(message),
        }
    }
}

/// Identity of one physical socket.
///
/// Every socket the registry opens gets a fresh id, so events from a socket
/// that has since been closed or replaced can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport-level failure reported by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketError {
    pub protocol: ProtocolName,
    pub message: String,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.protocol, self.message)
    }
}

impl std::error::Error for SocketError {}

/// Lifecycle and data events emitted by a physical socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Open,
    Message(RawMessage),
    Error(String),
    Close { code: u16, reason: String },
}

/// A socket event tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEnvelope {
    pub protocol: ProtocolName,
    pub socket_id: SocketId,
    pub event: SocketEvent,
}

impl SocketEnvelope {
    pub fn new(protocol: ProtocolName, socket_id: SocketId, event: SocketEvent) -> Self {
        Self { protocol, socket_id, event }
    }
}

/// Parse a legacy pipe-delimited float list such as `"1.5|2|-0.25"`.
///
/// Fields that are not numbers become `NaN` so positions stay aligned.
pub fn parse_pipe_floats(text: &str) -> Vec<f64> {
    text.split('|').map(|field| field.trim().parse::<f64>().unwrap_or(f64::NAN)).collect()
}
