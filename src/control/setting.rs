//! Remotely owned configuration values

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use super::channel::ControlChannel;
use super::frame::{ControlMessage, EnumOption, SettingDescriptor};
use crate::closeable::{CallbackHandle, CallbackList};
use crate::{ConsoleError, Result};

/// Type of a setting, with the metadata that type carries.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingKind {
    Bool,
    Int { min: Option<i64>, max: Option<i64> },
    Double { min: Option<f64>, max: Option<f64> },
    Enum { options: Vec<EnumOption> },
    /// `{hue: [lo, hi], sat: [lo, hi], val: [lo, hi]}`
    HsvRange,
    /// `{b, g, r}` bytes
    BgrColour,
    /// `[lo, hi]`
    DoubleRange { min: Option<f64>, max: Option<f64> },
    Text,
    TextList,
    /// A type this client has no view for
    Other(String),
}

impl SettingKind {
    pub fn from_descriptor(descriptor: &SettingDescriptor) -> Self {
        match descriptor.kind.as_str() {
            "bool" => SettingKind::Bool,
            "int" => SettingKind::Int {
                min: descriptor.min.map(|v| v as i64),
                max: descriptor.max.map(|v| v as i64),
            },
            "double" => SettingKind::Double { min: descriptor.min, max: descriptor.max },
            "enum" => SettingKind::Enum { options: descriptor.values.clone() },
            "hsv-range" => SettingKind::HsvRange,
            "bgr-colour" => SettingKind::BgrColour,
            "double-range" => SettingKind::DoubleRange { min: descriptor.min, max: descriptor.max },
            "string" => SettingKind::Text,
            "string[]" => SettingKind::TextList,
            other => SettingKind::Other(other.to_string()),
        }
    }

    /// Wire name of the type.
    pub fn type_name(&self) -> &str {
        match self {
            SettingKind::Bool => "bool",
            SettingKind::Int { .. } => "int",
            SettingKind::Double { .. } => "double",
            SettingKind::Enum { .. } => "enum",
            SettingKind::HsvRange => "hsv-range",
            SettingKind::BgrColour => "bgr-colour",
            SettingKind::DoubleRange { .. } => "double-range",
            SettingKind::Text => "string",
            SettingKind::TextList => "string[]",
            SettingKind::Other(name) => name,
        }
    }
}

/// Value of an `hsv-range` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct HsvRange {
    pub hue: [u8; 2],
    pub sat: [u8; 2],
    pub val: [u8; 2],
}

impl HsvRange {
    /// Whether a pixel falls inside every channel range.
    ///
    /// Hue is circular: a range with `hue[0] > hue[1]` wraps past 255.
    pub fn contains(&self, hue: u8, sat: u8, val: u8) -> bool {
        let within = |range: [u8; 2], v: u8| range[0] <= v && v <= range[1];
        let hue_ok = if self.is_hue_wrapped() {
            hue >= self.hue[0] || hue <= self.hue[1]
        } else {
            within(self.hue, hue)
        };
        hue_ok && within(self.sat, sat) && within(self.val, val)
    }

    pub fn is_hue_wrapped(&self) -> bool {
        self.hue[0] > self.hue[1]
    }
}

/// Value of a `bgr-colour` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct BgrColour {
    pub b: u8,
    pub g: u8,
    pub r: u8,
}

impl BgrColour {
    /// CSS hex form, e.g. `#ff8000`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Value of a `double-range` setting, `[min, max]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct DoubleRange {
    pub min: f64,
    pub max: f64,
}

impl From<[f64; 2]> for DoubleRange {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<DoubleRange> for [f64; 2] {
    fn from(range: DoubleRange) -> Self {
        [range.min, range.max]
    }
}

#[derive(Debug, Clone)]
struct SettingMeta {
    kind: SettingKind,
    read_only: bool,
    advanced: bool,
    default_value: Option<Value>,
    description: Option<String>,
}

impl SettingMeta {
    fn from_descriptor(descriptor: &SettingDescriptor) -> Self {
        Self {
            kind: SettingKind::from_descriptor(descriptor),
            read_only: descriptor.read_only,
            advanced: descriptor.advanced,
            default_value: descriptor.default_value.clone(),
            description: descriptor.description.clone(),
        }
    }
}

struct SettingInner {
    path: String,
    meta: Mutex<SettingMeta>,
    value: watch::Sender<Value>,
    trackers: CallbackList<Value>,
    channel: ControlChannel,
}

/// A typed, path-addressed configuration value owned by the robot.
///
/// The local value only changes when the robot reports a new one; writes
/// through [`set_value`](Self::set_value) are requests that may be refused.
/// Clones share identity with the catalog entry.
#[derive(Clone)]
pub struct Setting {
    inner: Arc<SettingInner>,
}

impl Setting {
    pub(crate) fn new(descriptor: &SettingDescriptor, channel: ControlChannel) -> Self {
        let (value, _) = watch::channel(descriptor.value.clone());
        Self {
            inner: Arc::new(SettingInner {
                path: descriptor.path.clone(),
                meta: Mutex::new(SettingMeta::from_descriptor(descriptor)),
                value,
                trackers: CallbackList::new(),
                channel,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn kind(&self) -> SettingKind {
        self.meta().kind.clone()
    }

    pub fn type_name(&self) -> String {
        self.meta().kind.type_name().to_string()
    }

    pub fn is_read_only(&self) -> bool {
        self.meta().read_only
    }

    pub fn is_advanced(&self) -> bool {
        self.meta().advanced
    }

    pub fn default_value(&self) -> Option<Value> {
        self.meta().default_value.clone()
    }

    /// Human label: the explicit description, or the last path segment
    /// with hyphens turned into spaces and the first letter capitalised.
    pub fn description(&self) -> String {
        if let Some(description) = self.meta().description.as_deref().filter(|d| !d.is_empty()) {
            return description.to_string();
        }
        humanize_path(&self.inner.path)
    }

    /// Current value as last reported by the robot.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Current value deserialized as `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&*self.inner.value.borrow()).map_err(|e| ConsoleError::TypeConversion {
            details: format!("setting '{}': {e}", self.inner.path),
        })
    }

    /// Call `callback` with the current value now and with every new value
    /// the robot reports later.
    pub fn track<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        callback(&self.value());
        self.inner.trackers.add(callback)
    }

    pub fn tracker_count(&self) -> usize {
        self.inner.trackers.len()
    }

    /// Stream of the current value followed by every later one.
    pub fn watch(&self) -> WatchStream<Value> {
        WatchStream::new(self.inner.value.subscribe())
    }

    /// Ask the robot to change the value.
    ///
    /// Nothing changes locally; trackers fire once the robot confirms with
    /// an update frame.
    pub fn set_value(&self, value: Value) -> Result<()> {
        self.inner.channel.send(&ControlMessage::setting(self.inner.path.clone(), value))
    }

    /// Serialize `value` and ask the robot to apply it.
    pub fn set<T: Serialize>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ConsoleError::TypeConversion { details: e.to_string() })?;
        self.set_value(value)
    }

    /// Whether both handles refer to the same catalog entry.
    pub fn ptr_eq(&self, other: &Setting) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Store a value reported by the robot and notify trackers.
    pub(crate) fn apply_update(&self, value: Value) {
        debug!(path = %self.inner.path, %value, "Setting updated");
        self.inner.value.send_replace(value.clone());
        self.inner.trackers.notify(&value);
    }

    /// Take new metadata from a later sync frame.
    ///
    /// Returns the new value when it differs from the current one; the
    /// caller applies it once no locks are held.
    pub(crate) fn refresh(&self, descriptor: &SettingDescriptor) -> Option<Value> {
        *self.meta() = SettingMeta::from_descriptor(descriptor);
        (*self.inner.value.borrow() != descriptor.value).then(|| descriptor.value.clone())
    }

    fn meta(&self) -> MutexGuard<'_, SettingMeta> {
        self.inner.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("path", &self.inner.path)
            .field("type", &self.meta().kind.type_name())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

fn humanize_path(path: &str) -> String {
    let segment = path.rsplit('.').next().unwrap_or(path).replace('-', " ");
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
