//! Core types shared by the socket, subscription and control layers.
//!
//! ## Overview
//!
//! - [`ProtocolName`] names one logical channel; [`protocols`] lists the ones the robot serves
//! - [`RawMessage`] is a wire message, [`Payload`] is what a subscriber is handed
//! - [`SocketEvent`] / [`SocketEnvelope`] carry lifecycle and data events from sockets
//! - [`ConnectionStatus`] / [`StatusIndicator`] describe socket health per protocol
//! - [`UpdateRate`] caps how often a telemetry stream yields
//!
//! ## Usage Example
//!
//! ```rust
//! use round_table::types::{Payload, ProtocolName, RawMessage, protocols};
//!
//! let protocol = ProtocolName::from(protocols::WALK);
//! assert!(!protocol.is_control());
//!
//! let message = RawMessage::from(r#"{"running":true}"#);
//! let payload = Payload::Json(std::sync::Arc::new(message.decode_json().unwrap()));
//! assert_eq!(payload.as_json().unwrap()["running"], true);
//! ```

mod message;
mod protocol;
mod status;
mod update_rate;

pub use message::{
    Payload, RawMessage, SocketEnvelope, SocketError, SocketEvent, SocketId, parse_pipe_floats,
};
pub use protocol::{ProtocolName, protocols};
pub use status::{ConnectionStatus, StatusBoard, StatusIndicator};
pub use update_rate::UpdateRate;

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_pipe_floats_yield_one_value_per_field(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 1..32)
        ) {
            let text = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("|");
            let parsed = parse_pipe_floats(&text);
            prop_assert_eq!(parsed.len(), values.len());
            for (parsed, original) in parsed.iter().zip(&values) {
                prop_assert_eq!(parsed, original);
            }
        }

        #[test]
        fn prop_throttle_interval_matches_rate(hz in 1u32..1000) {
            let interval = UpdateRate::Max(hz).throttle_interval().expect("capped rates throttle");
            let reconstructed = 1.0 / interval.as_secs_f64();
            prop_assert!((reconstructed - hz as f64).abs() < 1e-6 * hz as f64);
            prop_assert!(UpdateRate::Max(hz).needs_throttle());
        }

        #[test]
        fn prop_indicator_title_names_protocol_and_count(
            name in "[A-Za-z][A-Za-z-]{0,20}",
            clients in 0usize..50
        ) {
            let mut indicator = StatusIndicator::new(ProtocolName::new(&name));
            indicator.client_count = clients;
            let title = indicator.title();
            prop_assert!(title.starts_with(&name));
            prop_assert!(title.contains(&clients.to_string()));
            prop_assert_eq!(title.ends_with("clients)"), clients != 1);
        }
    }

    #[test]
    fn native_rate_never_throttles() {
        assert_eq!(UpdateRate::Native.throttle_interval(), None);
        assert_eq!(UpdateRate::Max(0).normalize(), UpdateRate::Native);
        assert!(!UpdateRate::Max(0).needs_throttle());
    }

    #[test]
    fn state_protocols_exclude_camera_and_control() {
        assert!(!protocols::ALL_STATE_PROTOCOLS.contains(&protocols::CONTROL));
        assert!(!protocols::ALL_STATE_PROTOCOLS.contains(&protocols::CAMERA));
        assert!(ProtocolName::from(protocols::CONTROL).is_control());
    }

    #[test]
    fn protocol_name_serializes_as_plain_string() {
        let protocol = ProtocolName::from(protocols::WALK);
        assert_eq!(serde_json::to_value(&protocol).unwrap(), serde_json::json!("Walk"));
        let parsed: ProtocolName = serde_json::from_str("\"control-protocol\"").unwrap();
        assert!(parsed.is_control());
    }

    #[test]
    fn status_strings() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert!(ConnectionStatus::Error.is_down());
        assert!(!ConnectionStatus::Connecting.is_down());
    }
}
