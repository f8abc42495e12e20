//! Control channel wire format
//!
//! Robot to console:
//!
//! ```json
//! { "type": "sync", "actions": [...], "settings": [...], "fsms": [...], "motionScripts": [...] }
//! { "type": "update", "path": "vision.ball.hue", "value": 20 }
//! ```
//!
//! Console to robot:
//!
//! ```json
//! { "type": "action", "id": "motion.stand" }
//! { "type": "setting", "path": "vision.ball.hue", "value": 20 }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::{ConsoleError, Result};

/// Full catalog snapshot. List entries stay raw until the catalog is built.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFrame {
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub settings: Vec<Value>,
    #[serde(default)]
    pub fsms: Vec<Value>,
    #[serde(default)]
    pub motion_scripts: Vec<Value>,
}

/// New value for one setting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateFrame {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

/// One decoded control frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    Sync(SyncFrame),
    Update(UpdateFrame),
    /// A frame whose `type` this client does not handle
    Unsupported(String),
}

impl ControlFrame {
    /// Decode a frame from its JSON form.
    ///
    /// Unknown types decode to [`ControlFrame::Unsupported`]; a known type
    /// with a malformed body is a [`ConsoleError::Protocol`] error.
    pub fn from_value(value: &Value) -> Result<Self> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "sync" => SyncFrame::deserialize(value)
                .map(ControlFrame::Sync)
                .map_err(|e| ConsoleError::protocol_error("sync frame", e.to_string())),
            "update" => UpdateFrame::deserialize(value)
                .map(ControlFrame::Update)
                .map_err(|e| ConsoleError::protocol_error("update frame", e.to_string())),
            other => Ok(ControlFrame::Unsupported(other.to_string())),
        }
    }
}

/// Command sent to the robot. Fire-and-forget; there is no acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Action {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    Setting { path: String, value: Value },
}

impl ControlMessage {
    pub fn action(id: impl Into<String>) -> Self {
        ControlMessage::Action { id: id.into(), args: None }
    }

    pub fn setting(path: impl Into<String>, value: Value) -> Self {
        ControlMessage::Setting { path: path.into(), value }
    }
}

/// Action entry of a sync frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub has_arguments: bool,
}

/// One choice of an enum setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub value: Value,
    pub text: String,
}

/// Setting entry of a sync frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDescriptor {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, rename = "readonly")]
    pub read_only: bool,
    #[serde(default)]
    pub advanced: bool,
    #[serde(default, rename = "default")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: Vec<EnumOption>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Decode each raw list entry, logging and skipping the ones that fail.
pub(crate) fn parse_entries<T: DeserializeOwned>(what: &str, entries: &[Value]) -> Vec<T> {
    entries
        .iter()
        .filter_map(|entry| match T::deserialize(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                error!(kind = what, error = %e, entry = %entry, "Skipping malformed catalog entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_frame_defaults_missing_lists() {
        let frame = ControlFrame::from_value(&json!({"type": "sync", "settings": []})).unwrap();
        assert_eq!(frame, ControlFrame::Sync(SyncFrame::default()));
    }

    #[test]
    fn motion_scripts_are_kept_raw() {
        let frame = ControlFrame::from_value(&json!({
            "type": "sync",
            "motionScripts": [{"name": "stand-up", "stages": []}]
        }))
        .unwrap();
        let ControlFrame::Sync(sync) = frame else { panic!("expected sync") };
        assert_eq!(sync.motion_scripts[0]["name"], "stand-up");
    }

    #[test]
    fn unknown_and_missing_types_are_unsupported() {
        assert_eq!(
            ControlFrame::from_value(&json!({"type": "ping"})).unwrap(),
            ControlFrame::Unsupported("ping".into())
        );
        assert_eq!(ControlFrame::from_value(&json!({})).unwrap(), ControlFrame::Unsupported(String::new()));
    }

    #[test]
    fn malformed_update_is_a_protocol_error() {
        let err = ControlFrame::from_value(&json!({"type": "update", "value": 3})).unwrap_err();
        assert!(matches!(err, ConsoleError::Protocol { .. }));
    }

    #[test]
    fn messages_serialize_to_wire_shape() {
        assert_eq!(
            serde_json::to_value(ControlMessage::action("motion.stand")).unwrap(),
            json!({"type": "action", "id": "motion.stand"})
        );
        assert_eq!(
            serde_json::to_value(ControlMessage::setting("a.b", json!(99))).unwrap(),
            json!({"type": "setting", "path": "a.b", "value": 99})
        );
        let with_args = ControlMessage::Action { id: "head.look".into(), args: Some(json!({"x": 1})) };
        assert_eq!(serde_json::to_value(with_args).unwrap()["args"]["x"], 1);
    }

    #[test]
    fn setting_descriptor_reads_optional_fields() {
        let descriptor: SettingDescriptor = serde_json::from_value(json!({
            "path": "camera.mode",
            "type": "enum",
            "value": 1,
            "readonly": true,
            "default": 0,
            "values": [{"value": 0, "text": "Off"}, {"value": 1, "text": "On"}]
        }))
        .unwrap();
        assert!(descriptor.read_only);
        assert!(!descriptor.advanced);
        assert_eq!(descriptor.default_value, Some(json!(0)));
        assert_eq!(descriptor.values[1].text, "On");
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let entries = vec![json!({"id": "a", "label": "A"}), json!({"label": "no id"})];
        let actions: Vec<ActionDescriptor> = parse_entries("action", &entries);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "a");
    }
}
