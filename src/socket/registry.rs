//! Per-protocol socket table with connection status tracking

use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, trace, warn};

use super::{Connector, EventSink, Socket, SocketContext};
use crate::types::{
    ConnectionStatus, ProtocolName, RawMessage, SocketEnvelope, SocketEvent, SocketId, StatusBoard,
    StatusIndicator,
};
use crate::{ConsoleError, Result};

struct RegisteredSocket {
    id: SocketId,
    socket: Arc<dyn Socket>,
}

struct RegistryInner {
    url: String,
    connector: Arc<dyn Connector>,
    events: EventSink,
    next_socket_id: AtomicU64,
    sockets: Mutex<HashMap<ProtocolName, RegisteredSocket>>,
    board: watch::Sender<StatusBoard>,
}

/// Owns exactly one physical socket per protocol name.
///
/// The registry is a cheap handle; clones share the same table. It is
/// normally driven by the [`Multiplexer`](crate::subscription::Multiplexer),
/// which opens a protocol on its first subscriber and closes it after the
/// last one leaves.
#[derive(Clone)]
pub struct SocketRegistry {
    inner: Arc<RegistryInner>,
}

impl SocketRegistry {
    /// Create a registry that opens sockets against `url` through `connector`.
    pub fn new(url: impl Into<String>, connector: Arc<dyn Connector>, events: EventSink) -> Self {
        let (board, _) = watch::channel(StatusBoard::new());
        Self {
            inner: Arc::new(RegistryInner {
                url: url.into(),
                connector,
                events,
                next_socket_id: AtomicU64::new(1),
                sockets: Mutex::new(HashMap::new()),
                board,
            }),
        }
    }

    /// Endpoint URL every socket connects to.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Open the socket for `protocol`.
    ///
    /// Fails with [`ConsoleError::SocketAlreadyOpen`] if one is already
    /// registered; there is never more than one socket per protocol.
    pub fn open(&self, protocol: &ProtocolName) -> Result<SocketId> {
        if protocol.as_str().is_empty() {
            return Err(ConsoleError::InvalidProtocol { name: protocol.to_string() });
        }

        let mut sockets = self.sockets();
        if sockets.contains_key(protocol) {
            return Err(ConsoleError::SocketAlreadyOpen { protocol: protocol.to_string() });
        }

        let (id, socket) = self.connect(protocol)?;
        sockets.insert(protocol.clone(), RegisteredSocket { id, socket });
        // Indicator must exist before the driver can see this socket as current
        self.inner.board.send_modify(|board| {
            board.insert(protocol.clone(), StatusIndicator::new(protocol.clone()));
        });
        drop(sockets);

        info!(%protocol, socket = %id, url = %self.inner.url, "Opened socket");
        Ok(id)
    }

    /// Close and forget the socket for `protocol`, removing its indicator.
    pub fn close(&self, protocol: &ProtocolName) {
        let mut sockets = self.sockets();
        let removed = sockets.remove(protocol);
        if removed.is_some() {
            self.inner.board.send_modify(|board| {
                board.remove(protocol);
            });
        }
        drop(sockets);

        match removed {
            Some(registered) => {
                registered.socket.close();
                info!(%protocol, socket = %registered.id, "Closed socket");
            }
            None => warn!(%protocol, "Close requested for a protocol with no socket"),
        }
    }

    /// Send a message on the socket for `protocol`.
    pub fn send(&self, protocol: &ProtocolName, message: RawMessage) -> Result<()> {
        let socket = self
            .sockets()
            .get(protocol)
            .map(|registered| Arc::clone(&registered.socket))
            .ok_or_else(|| ConsoleError::SocketNotOpen { protocol: protocol.to_string() })?;

        trace!(%protocol, bytes = message.len(), "Sending message");
        socket.send(message)
    }

    /// Identity of the socket currently registered for `protocol`.
    pub fn socket_id(&self, protocol: &ProtocolName) -> Option<SocketId> {
        self.sockets().get(protocol).map(|registered| registered.id)
    }

    pub fn is_open(&self, protocol: &ProtocolName) -> bool {
        self.sockets().contains_key(protocol)
    }

    /// Protocols with a registered socket, in no particular order.
    pub fn open_protocols(&self) -> Vec<ProtocolName> {
        self.sockets().keys().cloned().collect()
    }

    /// Whether `socket_id` is the live socket for `protocol`.
    pub fn is_current(&self, protocol: &ProtocolName, socket_id: SocketId) -> bool {
        self.socket_id(protocol) == Some(socket_id)
    }

    /// Update the status indicator for a socket event.
    ///
    /// Returns `false` when the event came from a socket that is no longer
    /// registered; such events must be ignored by the caller too.
    pub fn record_event(&self, envelope: &SocketEnvelope) -> bool {
        if !self.is_current(&envelope.protocol, envelope.socket_id) {
            trace!(
                protocol = %envelope.protocol,
                socket = %envelope.socket_id,
                "Ignoring event from stale socket"
            );
            return false;
        }

        let status = match &envelope.event {
            SocketEvent::Open => ConnectionStatus::Connected,
            SocketEvent::Close { code, reason } => {
                debug!(protocol = %envelope.protocol, code, %reason, "Socket closed");
                ConnectionStatus::Disconnected
            }
            SocketEvent::Error(message) => {
                warn!(protocol = %envelope.protocol, %message, "Socket error");
                ConnectionStatus::Error
            }
            SocketEvent::Message(_) => return true,
        };

        self.set_status(&envelope.protocol, status);
        true
    }

    /// Record how many subscriptions share the socket for `protocol`.
    pub fn set_client_count(&self, protocol: &ProtocolName, count: usize) {
        self.inner.board.send_if_modified(|board| match board.get_mut(protocol) {
            Some(indicator) if indicator.client_count != count => {
                indicator.client_count = count;
                true
            }
            _ => false,
        });
    }

    /// Current status of `protocol`, if it has a socket.
    pub fn status(&self, protocol: &ProtocolName) -> Option<ConnectionStatus> {
        self.inner.board.borrow().get(protocol).map(|indicator| indicator.status)
    }

    /// Snapshot of every indicator.
    pub fn status_board(&self) -> StatusBoard {
        self.inner.board.borrow().clone()
    }

    /// Receiver that is notified whenever any indicator changes.
    pub fn watch_status(&self) -> watch::Receiver<StatusBoard> {
        self.inner.board.subscribe()
    }

    /// Stream of indicator snapshots, starting with the current one.
    pub fn status_updates(&self) -> impl Stream<Item = StatusBoard> + 'static {
        WatchStream::new(self.watch_status())
    }

    /// True when no protocol is currently connected.
    pub fn is_all_disconnected(&self) -> bool {
        self.inner
            .board
            .borrow()
            .values()
            .all(|indicator| indicator.status != ConnectionStatus::Connected)
    }

    /// Close every physical socket but keep the registrations.
    ///
    /// Subscriptions stay attached; [`reconnect_all`](Self::reconnect_all)
    /// brings the sockets back.
    pub fn disconnect_all(&self) {
        info!("Disconnecting all protocols");
        let sockets: Vec<(ProtocolName, Arc<dyn Socket>)> = self
            .sockets()
            .iter()
            .map(|(protocol, registered)| (protocol.clone(), Arc::clone(&registered.socket)))
            .collect();

        for (protocol, socket) in sockets {
            socket.close();
            self.set_status(&protocol, ConnectionStatus::Disconnected);
        }
    }

    /// Reopen every registered protocol whose socket is down.
    ///
    /// Returns the protocols that were reopened. Protocols that fail to
    /// reopen are logged and left in their current state.
    pub fn reconnect_all(&self) -> Vec<ProtocolName> {
        info!("Reconnecting all protocols");
        let mut reopened = Vec::new();
        for protocol in self.open_protocols() {
            match self.reconnect(&protocol) {
                Ok(true) => reopened.push(protocol),
                Ok(false) => {}
                Err(e) => warn!(%protocol, error = %e, "Failed to reconnect"),
            }
        }
        reopened
    }

    /// Replace the socket for `protocol` if its status is down.
    ///
    /// Returns `Ok(false)` when the socket is healthy or not registered.
    pub fn reconnect(&self, protocol: &ProtocolName) -> Result<bool> {
        if !self.status(protocol).is_some_and(ConnectionStatus::is_down) {
            return Ok(false);
        }

        let mut sockets = self.sockets();
        let Some(registered) = sockets.get_mut(protocol) else {
            return Ok(false);
        };

        registered.socket.close();
        let (id, socket) = self.connect(protocol)?;
        let previous = std::mem::replace(registered, RegisteredSocket { id, socket });
        self.set_status(protocol, ConnectionStatus::Connecting);
        drop(sockets);

        info!(%protocol, previous = %previous.id, socket = %id, "Reconnected socket");
        Ok(true)
    }

    fn connect(&self, protocol: &ProtocolName) -> Result<(SocketId, Arc<dyn Socket>)> {
        let id = SocketId(self.inner.next_socket_id.fetch_add(1, Ordering::Relaxed));
        let context = SocketContext {
            url: self.inner.url.clone(),
            protocol: protocol.clone(),
            socket_id: id,
            events: self.inner.events.clone(),
        };
        let socket = self.inner.connector.open(context)?;
        Ok((id, socket))
    }

    fn set_status(&self, protocol: &ProtocolName, status: ConnectionStatus) {
        self.inner.board.send_if_modified(|board| match board.get_mut(protocol) {
            Some(indicator) if indicator.status != status => {
                indicator.status = status;
                true
            }
            _ => false,
        });
    }

    fn sockets(&self) -> MutexGuard<'_, HashMap<ProtocolName, RegisteredSocket>> {
        self.inner.sockets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("url", &self.inner.url)
            .field("sockets", &self.sockets().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::event_channel;
    use crate::test_utils::{MOCK_URL, MockConnector};

    fn registry() -> (MockConnector, SocketRegistry, crate::socket::EventSource) {
        let connector = MockConnector::new();
        let (events, source) = event_channel();
        let registry = SocketRegistry::new(MOCK_URL, Arc::new(connector.clone()), events);
        (connector, registry, source)
    }

    fn walk() -> ProtocolName {
        ProtocolName::from("Walk")
    }

    #[test]
    fn open_registers_one_socket_per_protocol() {
        let (connector, registry, _source) = registry();
        let id = registry.open(&walk()).unwrap();

        assert_eq!(registry.socket_id(&walk()), Some(id));
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Connecting));
        assert!(matches!(registry.open(&walk()), Err(ConsoleError::SocketAlreadyOpen { .. })));
        assert_eq!(connector.open_count(), 1);
    }

    #[test]
    fn empty_protocol_is_rejected() {
        let (connector, registry, _source) = registry();
        let err = registry.open(&ProtocolName::from("")).unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidProtocol { .. }));
        assert_eq!(connector.open_count(), 0);
    }

    #[test]
    fn failed_connect_leaves_no_entry() {
        let (connector, registry, _source) = registry();
        connector.fail_next_open("refused");
        assert!(registry.open(&walk()).is_err());
        assert!(!registry.is_open(&walk()));
        assert!(registry.status_board().is_empty());
    }

    #[test]
    fn close_removes_socket_and_indicator() {
        let (connector, registry, _source) = registry();
        registry.open(&walk()).unwrap();
        registry.close(&walk());

        assert!(!registry.is_open(&walk()));
        assert!(registry.status(&walk()).is_none());
        assert!(connector.latest("Walk").unwrap().is_closed());

        // Second close is a logged no-op
        registry.close(&walk());
    }

    #[test]
    fn lifecycle_events_drive_status() {
        let (connector, registry, mut source) = registry();
        registry.open(&walk()).unwrap();
        let socket = connector.latest("Walk").unwrap();

        socket.open();
        assert!(registry.record_event(&source.try_recv().unwrap()));
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Connected));
        assert!(!registry.is_all_disconnected());

        socket.push_error("boom");
        registry.record_event(&source.try_recv().unwrap());
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Error));

        socket.push_close(1006);
        registry.record_event(&source.try_recv().unwrap());
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Disconnected));
        assert!(registry.is_all_disconnected());
    }

    #[test]
    fn stale_events_are_ignored() {
        let (connector, registry, mut source) = registry();
        registry.open(&walk()).unwrap();
        let first = connector.latest("Walk").unwrap();
        registry.close(&walk());
        registry.open(&walk()).unwrap();

        first.open();
        let envelope = source.try_recv().unwrap();
        assert!(!registry.record_event(&envelope));
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Connecting));
    }

    #[test]
    fn send_requires_open_socket() {
        let (connector, registry, _source) = registry();
        assert!(matches!(
            registry.send(&walk(), RawMessage::from("x")),
            Err(ConsoleError::SocketNotOpen { .. })
        ));

        registry.open(&walk()).unwrap();
        registry.send(&walk(), RawMessage::from("hello")).unwrap();
        assert_eq!(connector.latest("Walk").unwrap().sent(), vec![RawMessage::from("hello")]);
    }

    #[test]
    fn disconnect_and_reconnect_all() {
        let (connector, registry, mut source) = registry();
        let control = ProtocolName::from("control-protocol");
        registry.open(&walk()).unwrap();
        registry.open(&control).unwrap();
        for socket in connector.opened() {
            socket.open();
        }
        while let Some(envelope) = source.try_recv() {
            registry.record_event(&envelope);
        }

        registry.disconnect_all();
        assert!(registry.is_all_disconnected());
        assert!(connector.opened().iter().all(|s| s.is_closed()));
        assert!(registry.is_open(&walk()));

        let old_id = registry.socket_id(&walk());
        let mut reopened = registry.reconnect_all();
        reopened.sort();
        assert_eq!(reopened, vec![walk(), control.clone()]);
        assert_ne!(registry.socket_id(&walk()), old_id);
        assert_eq!(registry.status(&walk()), Some(ConnectionStatus::Connecting));
        assert_eq!(connector.live("Walk").len(), 1);

        // Healthy sockets are left alone
        assert!(registry.reconnect_all().is_empty());
    }

    #[test]
    fn client_count_updates_title() {
        let (_connector, registry, _source) = registry();
        registry.open(&walk()).unwrap();
        registry.set_client_count(&walk(), 2);
        assert_eq!(registry.status_board()[&walk()].title(), "Walk (2 clients)");
    }

    #[tokio::test]
    async fn status_updates_stream_board_changes() {
        use futures::StreamExt;

        let (_connector, registry, _source) = registry();
        let mut updates = Box::pin(registry.status_updates());
        assert!(updates.next().await.unwrap().is_empty());

        registry.open(&walk()).unwrap();
        let board = updates.next().await.unwrap();
        assert_eq!(board[&walk()].status, ConnectionStatus::Connecting);
    }
}
