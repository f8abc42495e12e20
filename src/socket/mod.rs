//! Physical sockets and the per-protocol socket registry.
//!
//! The transport is abstracted behind two small traits so the registry and
//! everything above it can run over a real websocket or an in-memory fake:
//!
//! - [`Connector`] opens a socket for one protocol
//! - [`Socket`] sends messages and closes
//!
//! Sockets never call back into the console directly. They push
//! [`SocketEnvelope`]s into an [`EventSink`]; whoever owns the matching
//! [`EventSource`] (normally the [`Driver`](crate::driver::Driver)) feeds
//! them to the multiplexer one at a time.

mod registry;
mod websocket;

pub use registry::SocketRegistry;
pub use websocket::WebSocketConnector;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::Result;
use crate::types::{ProtocolName, RawMessage, SocketEnvelope, SocketEvent, SocketId};

/// One physical duplex message socket.
pub trait Socket: Send + Sync + 'static {
    /// Queue a message for sending.
    ///
    /// Sends are fire-and-forget; `Ok` only means the message was accepted
    /// by the transport.
    fn send(&self, message: RawMessage) -> Result<()>;

    /// Close the socket. Closing twice is harmless.
    fn close(&self);
}

/// Everything a connector needs to open one socket.
#[derive(Debug, Clone)]
pub struct SocketContext {
    /// Endpoint URL shared by every protocol
    pub url: String,
    /// Sub-protocol selecting the channel
    pub protocol: ProtocolName,
    /// Identity the socket must stamp on its events
    pub socket_id: SocketId,
    /// Where the socket reports its events
    pub events: EventSink,
}

impl SocketContext {
    /// Emit an event for this socket.
    pub fn emit(&self, event: SocketEvent) {
        self.events.emit(SocketEnvelope::new(self.protocol.clone(), self.socket_id, event));
    }
}

/// Opens physical sockets.
///
/// Implementations must not emit events synchronously from inside `open`
/// in a way that requires them to be handled before `open` returns; events
/// are queued through [`SocketContext::events`].
pub trait Connector: Send + Sync + 'static {
    fn open(&self, context: SocketContext) -> Result<Arc<dyn Socket>>;
}

/// Sending half of the socket event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SocketEnvelope>,
}

impl EventSink {
    /// Queue an event. Events emitted after the source is gone are dropped.
    pub fn emit(&self, envelope: SocketEnvelope) {
        if self.tx.send(envelope).is_err() {
            tracing::trace!("Socket event dropped, event source is gone");
        }
    }
}

/// Receiving half of the socket event queue.
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::UnboundedReceiver<SocketEnvelope>,
}

impl EventSource {
    /// Wait for the next event; `None` once every sink is dropped.
    pub async fn recv(&mut self) -> Option<SocketEnvelope> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SocketEnvelope> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sink/source pair.
pub fn event_channel() -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventSource { rx })
}
