//! Back-reference from catalog entities to the control channel

use std::sync::Weak;

use super::{ControlClient, ControlInner};
use crate::control::ControlMessage;
use crate::{ConsoleError, Result};

/// Lets settings and actions send through the client that created them
/// without keeping it alive.
#[derive(Clone, Default)]
pub(crate) struct ControlChannel {
    client: Weak<ControlInner>,
}

impl ControlChannel {
    pub(crate) fn new(client: Weak<ControlInner>) -> Self {
        Self { client }
    }

    /// A channel with no client behind it; every send fails.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self::default()
    }

    pub(crate) fn send(&self, message: &ControlMessage) -> Result<()> {
        let inner = self.client.upgrade().ok_or(ConsoleError::NotConnected)?;
        ControlClient::from_inner(inner).send(message)
    }
}
