//! Connection status indicators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::ProtocolName;

/// Connection state of one physical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ConnectionStatus {
    /// Socket created, handshake not finished
    Connecting,
    /// Handshake finished, messages flowing
    Connected,
    /// Socket closed (by either side)
    Disconnected,
    /// Transport reported an error
    Error,
}

impl ConnectionStatus {
    /// CSS-style class name, as used by status displays.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }

    /// Whether a reconnect attempt makes sense from this state.
    pub fn is_down(self) -> bool {
        matches!(self, ConnectionStatus::Disconnected | ConnectionStatus::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visible status of one protocol's socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusIndicator {
    pub protocol: ProtocolName,
    pub status: ConnectionStatus,
    /// Number of subscriptions sharing the socket
    pub client_count: usize,
}

impl StatusIndicator {
    pub fn new(protocol: ProtocolName) -> Self {
        Self { protocol, status: ConnectionStatus::Connecting, client_count: 0 }
    }

    /// Tooltip text, e.g. `"Walk (2 clients)"`.
    pub fn title(&self) -> String {
        let plural = if self.client_count == 1 { "" } else { "s" };
        format!("{} ({} client{})", self.protocol, self.client_count, plural)
    }
}

/// Snapshot of every live indicator, keyed by protocol.
pub type StatusBoard = BTreeMap<ProtocolName, StatusIndicator>;
