//! Error types for the console data layer.
//!
//! Every fallible operation in round-table returns [`ConsoleError`]. The enum
//! carries structured context (protocol names, setting paths, file paths) so
//! callers can log meaningful messages without re-deriving where a failure
//! came from.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: socket open failures and failed sends
//! - **Registry Errors**: misuse of the per-protocol socket table
//! - **Subscriber Errors**: JSON decode failures and handler failures during fan-out
//! - **Control Errors**: malformed control frames, use before connect
//! - **Configuration Errors**: endpoint, YAML and logging setup problems
//!
//! Protocol-logic faults on the control channel (unknown frame types, updates
//! for unknown paths, lookups that match nothing) are *not* errors. They are
//! logged and the console carries on.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use round_table::ConsoleError;
//!
//! let error = ConsoleError::connection_failed("camera-protocol", "connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for console operations.
pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;

/// Boxed error used for transport and handler sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for console operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConsoleError {
    #[error("Failed to connect protocol '{protocol}': {reason}")]
    Connection {
        protocol: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid protocol name: {name:?}")]
    InvalidProtocol { name: String },

    #[error("A socket is already open for protocol '{protocol}'")]
    SocketAlreadyOpen { protocol: String },

    #[error("No socket is open for protocol '{protocol}'")]
    SocketNotOpen { protocol: String },

    #[error("Subscription to '{protocol}' is closed")]
    SubscriptionClosed { protocol: String },

    #[error("Failed to send on '{protocol}': {reason}")]
    Send { protocol: String, reason: String },

    #[error("Failed to decode JSON message on '{protocol}'")]
    Decode {
        protocol: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Subscriber on '{protocol}' raised an error")]
    Subscriber {
        protocol: String,
        #[source]
        source: BoxError,
    },

    #[error("Control protocol error in {context}: {details}")]
    Protocol { context: String, details: String },

    #[error("Control channel is not connected")]
    NotConnected,

    #[error("Control channel is already connected")]
    AlreadyConnected,

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("Invalid endpoint '{url}': {reason}")]
    Endpoint { url: String, reason: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error: {details}")]
    Config { details: String },

    #[error("Failed to initialise logging: {reason}")]
    Logging { reason: String },
}

impl ConsoleError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsoleError::Connection { .. } => true,
            ConsoleError::Send { .. } => true,
            ConsoleError::SocketNotOpen { .. } => true,
            ConsoleError::NotConnected => true,
            ConsoleError::InvalidProtocol { .. } => false,
            ConsoleError::SocketAlreadyOpen { .. } => false,
            ConsoleError::SubscriptionClosed { .. } => false,
            ConsoleError::Decode { .. } => false,
            ConsoleError::Subscriber { .. } => false,
            ConsoleError::Protocol { .. } => false,
            ConsoleError::AlreadyConnected => false,
            ConsoleError::TypeConversion { .. } => false,
            ConsoleError::Endpoint { .. } => false,
            ConsoleError::File { .. } => false,
            ConsoleError::Config { .. } => false,
            ConsoleError::Logging { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ConsoleError::Connection { .. } => vec![
                "Ensure the robot process is running",
                "Check the websocket port is reachable from this machine",
                "Use the ?host= parameter to point at another robot",
            ],
            ConsoleError::InvalidProtocol { .. } => {
                vec!["Use one of the protocol names in round_table::protocols"]
            }
            ConsoleError::SocketAlreadyOpen { .. } => vec![
                "Subscribe through the Multiplexer instead of opening sockets directly",
                "Close the existing socket before opening a new one",
            ],
            ConsoleError::SocketNotOpen { .. } => vec![
                "Call reconnect_all() to reopen disconnected protocols",
                "Check that at least one subscription is still open",
            ],
            ConsoleError::SubscriptionClosed { .. } => vec![
                "Create a new subscription",
                "Check whether the message handler returned an error",
            ],
            ConsoleError::Send { .. } => vec![
                "Check the connection status indicator for the protocol",
                "Reconnect and resend",
            ],
            ConsoleError::Decode { .. } => vec![
                "Subscribe with SubscribeOptions::raw for non-JSON protocols",
                "Verify the robot and console versions match",
            ],
            ConsoleError::Subscriber { .. } => vec![
                "Inspect the handler error source",
                "Resubscribe once the handler is fixed",
            ],
            ConsoleError::Protocol { .. } => vec![
                "Verify the robot and console versions match",
                "Dump the offending frame with debug logging enabled",
            ],
            ConsoleError::NotConnected => vec!["Call ControlClient::connect before sending"],
            ConsoleError::AlreadyConnected => vec!["Share the existing ControlClient"],
            ConsoleError::TypeConversion { .. } => vec![
                "Check the setting type before converting its value",
                "Use the raw JSON value instead",
            ],
            ConsoleError::Endpoint { .. } => vec![
                "Check the page URL or configured host",
                "Use host:port without a scheme in the host parameter",
            ],
            ConsoleError::File { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            ConsoleError::Config { .. } => vec![
                "Check the YAML syntax",
                "Compare against the documented configuration keys",
            ],
            ConsoleError::Logging { .. } => vec![
                "Check the log filter syntax",
                "Only initialise logging once per process",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(protocol: impl Into<String>, reason: impl Into<String>) -> Self {
        ConsoleError::Connection { protocol: protocol.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        protocol: impl Into<String>,
        reason: impl Into<String>,
        source: BoxError,
    ) -> Self {
        ConsoleError::Connection {
            protocol: protocol.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for send failures.
    pub fn send_failed(protocol: impl Into<String>, reason: impl Into<String>) -> Self {
        ConsoleError::Send { protocol: protocol.into(), reason: reason.into() }
    }

    /// Helper constructor for subscriber handler failures.
    pub fn subscriber_failed(protocol: impl Into<String>, source: anyhow::Error) -> Self {
        ConsoleError::Subscriber { protocol: protocol.into(), source: source.into() }
    }

    /// Helper constructor for control protocol errors.
    pub fn protocol_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        ConsoleError::Protocol { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration file errors.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        ConsoleError::File { path, source }
    }

    /// Helper constructor for endpoint errors.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ConsoleError::Endpoint { url: url.into(), reason: reason.into() }
    }
}

impl From<serde_yaml_ng::Error> for ConsoleError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ConsoleError::Config { details: err.to_string() }
    }
}
