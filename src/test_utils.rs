//! Test utilities: an in-memory transport and helpers to pump socket events
//!
//! [`MockConnector`] stands in for the websocket transport. Every socket it
//! opens records what was sent to it and lets a test play the robot's side
//! by pushing open/message/error/close events into the event queue.

#![cfg(any(test, feature = "benchmark"))]

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::socket::{Connector, EventSource, Socket, SocketContext, SocketRegistry, event_channel};
use crate::subscription::Multiplexer;
use crate::types::{ProtocolName, RawMessage, SocketEvent, SocketId};
use crate::{ConsoleError, Result};

/// Endpoint URL used by mock graphs.
pub const MOCK_URL: &str = "ws://robot.test:8080";

/// Install a test tracing subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("round_table=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct MockState {
    sockets: Vec<Arc<MockSocket>>,
    fail_next: Option<String>,
}

/// Connector that opens in-memory sockets.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every socket opened so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<MockSocket>> {
        self.state().sockets.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().sockets.len()
    }

    /// Most recently opened socket for `protocol`.
    pub fn latest(&self, protocol: &str) -> Option<Arc<MockSocket>> {
        self.state().sockets.iter().rev().find(|s| s.protocol().as_str() == protocol).cloned()
    }

    /// Sockets for `protocol` that have not been closed.
    pub fn live(&self, protocol: &str) -> Vec<Arc<MockSocket>> {
        self.state()
            .sockets
            .iter()
            .filter(|s| s.protocol().as_str() == protocol && !s.is_closed())
            .cloned()
            .collect()
    }

    /// Make the next `open` call fail with a connection error.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state().fail_next = Some(reason.into());
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    fn open(&self, context: SocketContext) -> Result<Arc<dyn Socket>> {
        let mut state = self.state();
        if let Some(reason) = state.fail_next.take() {
            return Err(ConsoleError::connection_failed(context.protocol.as_str(), reason));
        }
        let socket = Arc::new(MockSocket {
            context,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        state.sockets.push(Arc::clone(&socket));
        Ok(socket)
    }
}

/// One in-memory socket.
pub struct MockSocket {
    context: SocketContext,
    sent: Mutex<Vec<RawMessage>>,
    closed: AtomicBool,
}

impl MockSocket {
    pub fn protocol(&self) -> &ProtocolName {
        &self.context.protocol
    }

    pub fn socket_id(&self) -> SocketId {
        self.context.socket_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Messages sent by the console, in order.
    pub fn sent(&self) -> Vec<RawMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sent messages decoded as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent().iter().filter_map(|m| m.decode_json().ok()).collect()
    }

    /// Report the handshake as complete.
    pub fn open(&self) {
        self.context.emit(SocketEvent::Open);
    }

    /// Push a text message from the robot.
    pub fn push_text(&self, text: &str) {
        self.context.emit(SocketEvent::Message(RawMessage::from(text)));
    }

    /// Push a JSON message from the robot.
    pub fn push_json(&self, value: &Value) {
        self.push_text(&value.to_string());
    }

    /// Push a binary message from the robot.
    pub fn push_binary(&self, bytes: &[u8]) {
        self.context.emit(SocketEvent::Message(RawMessage::from(bytes.to_vec())));
    }

    /// Report a transport error.
    pub fn push_error(&self, message: &str) {
        self.context.emit(SocketEvent::Error(message.to_string()));
    }

    /// Report the socket as closed by the robot.
    pub fn push_close(&self, code: u16) {
        self.context.emit(SocketEvent::Close { code, reason: String::new() });
    }
}

impl Socket for MockSocket {
    fn send(&self, message: RawMessage) -> Result<()> {
        if self.is_closed() {
            return Err(ConsoleError::send_failed(self.context.protocol.as_str(), "socket is closed"));
        }
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(message);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Build a registry and multiplexer over a fresh [`MockConnector`].
pub fn mock_multiplexer() -> (MockConnector, Multiplexer, EventSource) {
    let connector = MockConnector::new();
    let (events, source) = event_channel();
    let registry = SocketRegistry::new(MOCK_URL, Arc::new(connector.clone()), events);
    (connector, Multiplexer::new(registry), source)
}

/// Dispatch every queued event, collecting the dispatch results.
pub fn pump(source: &mut EventSource, multiplexer: &Multiplexer) -> Vec<Result<()>> {
    let mut results = Vec::new();
    while let Some(envelope) = source.try_recv() {
        results.push(multiplexer.dispatch(envelope));
    }
    results
}

/// Dispatch every queued event, panicking on the first dispatch error.
pub fn pump_ok(source: &mut EventSource, multiplexer: &Multiplexer) {
    for result in pump(source, multiplexer) {
        if let Err(e) = result {
            panic!("dispatch failed: {e}");
        }
    }
}
