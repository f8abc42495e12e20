//! Protocol names identifying logical data channels

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of one logical data channel.
///
/// A protocol name maps 1:1 onto a physical socket; it is passed to the robot
/// as the websocket sub-protocol. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolName(Arc<str>);

impl ProtocolName {
    /// Create a protocol name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The protocol name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the dedicated control protocol.
    pub fn is_control(&self) -> bool {
        self.as_str() == protocols::CONTROL
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProtocolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ProtocolName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProtocolName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProtocolName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ProtocolName> for ProtocolName {
    fn from(name: &ProtocolName) -> Self {
        name.clone()
    }
}

/// Well-known protocol names served by the robot.
pub mod protocols {
    /// Raw camera images (binary blobs).
    pub const CAMERA: &str = "camera-protocol";
    /// Settings, actions and FSM descriptions.
    pub const CONTROL: &str = "control-protocol";

    pub const AGENT_FRAME: &str = "AgentFrame";
    pub const AUDIO_POWER_SPECTRUM: &str = "AudioPowerSpectrum";
    pub const BALANCE: &str = "Balance";
    pub const BODY: &str = "Body";
    pub const BEHAVIOUR_CONTROL: &str = "BehaviourControl";
    pub const BODY_CONTROL: &str = "BodyControl";
    pub const CAMERA_FRAME: &str = "CameraFrame";
    pub const DRAWING: &str = "Drawing";
    pub const GAME: &str = "Game";
    pub const HARDWARE: &str = "Hardware";
    pub const LABEL_COUNT: &str = "LabelCount";
    pub const LABEL_TEACHER: &str = "LabelTeacher";
    pub const LED: &str = "LED";
    pub const MESSAGE_COUNT: &str = "MessageCount";
    pub const MOTION_TASK: &str = "MotionTask";
    pub const MOTION_TIMING: &str = "MotionTiming";
    pub const ODOMETRY: &str = "Odometry";
    pub const OPTION_TREE: &str = "OptionTree";
    pub const ORIENTATION: &str = "Orientation";
    pub const PARTICLE: &str = "Particle";
    pub const STATIC_HARDWARE: &str = "StaticHardware";
    pub const STATIONARY_MAP: &str = "StationaryMap";
    pub const TEAM: &str = "Team";
    pub const THINK_TIMING: &str = "ThinkTiming";
    pub const WALK: &str = "Walk";
    pub const WORLD_FRAME: &str = "WorldFrame";

    /// Every per-state protocol. All of them carry JSON objects.
    pub const ALL_STATE_PROTOCOLS: &[&str] = &[
        AGENT_FRAME,
        AUDIO_POWER_SPECTRUM,
        BALANCE,
        BEHAVIOUR_CONTROL,
        BODY_CONTROL,
        BODY,
        CAMERA_FRAME,
        DRAWING,
        GAME,
        HARDWARE,
        LABEL_COUNT,
        LABEL_TEACHER,
        LED,
        MESSAGE_COUNT,
        MOTION_TASK,
        MOTION_TIMING,
        ODOMETRY,
        OPTION_TREE,
        ORIENTATION,
        PARTICLE,
        STATIC_HARDWARE,
        STATIONARY_MAP,
        TEAM,
        THINK_TIMING,
        WALK,
        WORLD_FRAME,
    ];
}
