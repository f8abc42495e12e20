//! Remotely triggerable actions

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::channel::ControlChannel;
use super::frame::{ActionDescriptor, ControlMessage};
use crate::Result;

struct ActionInner {
    descriptor: ActionDescriptor,
    channel: ControlChannel,
}

/// A command the robot can run. Immutable once built from a sync frame.
#[derive(Clone)]
pub struct Action {
    inner: Arc<ActionInner>,
}

impl Action {
    pub(crate) fn new(descriptor: ActionDescriptor, channel: ControlChannel) -> Self {
        Self { inner: Arc::new(ActionInner { descriptor, channel }) }
    }

    pub fn id(&self) -> &str {
        &self.inner.descriptor.id
    }

    pub fn label(&self) -> &str {
        &self.inner.descriptor.label
    }

    /// Whether the action expects arguments via [`activate_with`](Self::activate_with).
    pub fn has_arguments(&self) -> bool {
        self.inner.descriptor.has_arguments
    }

    /// Ask the robot to run the action.
    pub fn activate(&self) -> Result<()> {
        self.inner.channel.send(&ControlMessage::action(self.id()))
    }

    /// Ask the robot to run the action with arguments.
    pub fn activate_with(&self, args: Value) -> Result<()> {
        self.inner
            .channel
            .send(&ControlMessage::Action { id: self.id().to_string(), args: Some(args) })
    }

    pub fn ptr_eq(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.inner.descriptor.id)
            .field("label", &self.inner.descriptor.label)
            .field("has_arguments", &self.inner.descriptor.has_arguments)
            .finish()
    }
}
