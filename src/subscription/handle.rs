//! Client-facing subscription handle

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::Multiplexer;
use super::multiplexer::SubscriberRecord;
use crate::closeable::Closeable;
use crate::types::{ProtocolName, RawMessage};
use crate::{ConsoleError, Result};

/// A lease on a shared protocol channel.
///
/// Dropping the subscription closes it. A subscription whose handler failed
/// is closed by the multiplexer; it then reports [`is_closed`](Self::is_closed)
/// and refuses to send.
pub struct Subscription {
    multiplexer: Multiplexer,
    record: Arc<SubscriberRecord>,
}

impl Subscription {
    pub(super) fn new(multiplexer: Multiplexer, record: Arc<SubscriberRecord>) -> Self {
        Self { multiplexer, record }
    }

    pub fn protocol(&self) -> &ProtocolName {
        &self.record.protocol
    }

    /// Whether messages are delivered decoded as JSON.
    pub fn parses_json(&self) -> bool {
        self.record.parse_json
    }

    pub fn is_closed(&self) -> bool {
        self.record.is_closed()
    }

    /// Forward `message` verbatim to the shared socket.
    pub fn send(&self, message: impl Into<RawMessage>) -> Result<()> {
        if self.is_closed() {
            return Err(ConsoleError::SubscriptionClosed { protocol: self.protocol().to_string() });
        }
        self.multiplexer.send(self.protocol(), message.into())
    }

    /// Serialize `value` as JSON and send it as a text message.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| ConsoleError::TypeConversion { details: e.to_string() })?;
        self.send(text)
    }

    /// Leave the channel. Closing again is a no-op.
    pub fn close(&self) {
        self.multiplexer.close_record(&self.record);
    }
}

impl Closeable for Subscription {
    fn close(&self) {
        Subscription::close(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("protocol", &self.record.protocol)
            .field("id", &self.record.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
