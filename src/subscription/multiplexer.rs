//! Fan-in/fan-out of one socket per protocol

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, trace, warn};

use super::{ErrorHandler, MessageHandler, SubscribeOptions, Subscription};
use crate::socket::SocketRegistry;
use crate::types::{
    Payload, ProtocolName, RawMessage, SocketEnvelope, SocketError, SocketEvent, StatusBoard,
};
use crate::{ConsoleError, Result};

/// One subscriber of one protocol.
pub(crate) struct SubscriberRecord {
    pub(crate) id: u64,
    pub(crate) protocol: ProtocolName,
    pub(crate) parse_json: bool,
    on_message: MessageHandler,
    on_error: Option<ErrorHandler>,
    closed: AtomicBool,
}

impl SubscriberRecord {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct MultiplexerInner {
    registry: SocketRegistry,
    next_subscriber_id: AtomicU64,
    entries: Mutex<HashMap<ProtocolName, Vec<Arc<SubscriberRecord>>>>,
}

/// Shares one registry socket per protocol between many subscriptions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<MultiplexerInner>,
}

impl Multiplexer {
    pub fn new(registry: SocketRegistry) -> Self {
        Self {
            inner: Arc::new(MultiplexerInner {
                registry,
                next_subscriber_id: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The registry owning the physical sockets.
    pub fn registry(&self) -> &SocketRegistry {
        &self.inner.registry
    }

    /// Subscribe to `protocol`, opening its socket if this is the first
    /// subscriber.
    pub fn subscribe(
        &self,
        protocol: impl Into<ProtocolName>,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        let protocol = protocol.into();
        let record = Arc::new(SubscriberRecord {
            id: self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed),
            protocol: protocol.clone(),
            parse_json: options.parse_json,
            on_message: options.on_message,
            on_error: options.on_error,
            closed: AtomicBool::new(false),
        });

        let count = {
            let mut entries = self.entries();
            if !entries.contains_key(&protocol) {
                self.inner.registry.open(&protocol)?;
            }
            let subscribers = entries.entry(protocol.clone()).or_default();
            subscribers.push(Arc::clone(&record));
            let count = subscribers.len();
            // Counted under the lock so concurrent changes publish in order
            self.inner.registry.set_client_count(&protocol, count);
            count
        };

        debug!(%protocol, subscriber = record.id, clients = count, "Subscribed");
        Ok(Subscription::new(self.clone(), record))
    }

    /// Route one socket event to the subscribers of its protocol.
    ///
    /// Events from stale sockets are dropped. Lifecycle events only update
    /// the status board; errors are also handed to every subscriber's error
    /// handler.
    pub fn dispatch(&self, envelope: SocketEnvelope) -> Result<()> {
        if !self.inner.registry.record_event(&envelope) {
            return Ok(());
        }

        match envelope.event {
            SocketEvent::Open | SocketEvent::Close { .. } => Ok(()),
            SocketEvent::Error(message) => {
                let error = SocketError { protocol: envelope.protocol.clone(), message };
                for record in self.snapshot(&envelope.protocol) {
                    if record.is_closed() {
                        continue;
                    }
                    if let Some(on_error) = &record.on_error {
                        on_error(&error);
                    }
                }
                Ok(())
            }
            SocketEvent::Message(message) => self.fan_out(&envelope.protocol, &message),
        }
    }

    fn fan_out(&self, protocol: &ProtocolName, message: &RawMessage) -> Result<()> {
        let subscribers = self.snapshot(protocol);
        trace!(%protocol, bytes = message.len(), subscribers = subscribers.len(), "Fan-out");

        let mut decoded = None;
        for record in subscribers {
            // An earlier handler may have closed this one
            if record.is_closed() {
                continue;
            }

            let payload = if record.parse_json {
                // Empty frames carry nothing to decode
                if message.is_empty() {
                    continue;
                }
                let value = match &decoded {
                    Some(value) => Arc::clone(value),
                    None => match message.decode_json() {
                        Ok(value) => {
                            let value = Arc::new(value);
                            decoded = Some(Arc::clone(&value));
                            value
                        }
                        Err(source) => {
                            error!(%protocol, error = %source, "Undecodable message, closing subscriber");
                            self.close_record(&record);
                            return Err(ConsoleError::Decode { protocol: protocol.to_string(), source });
                        }
                    },
                };
                Payload::Json(value)
            } else {
                Payload::Raw(message.clone())
            };

            if let Err(e) = (record.on_message)(&payload) {
                error!(%protocol, subscriber = record.id, error = %e, "Subscriber failed, closing it");
                self.close_record(&record);
                return Err(ConsoleError::subscriber_failed(protocol.as_str(), e));
            }
        }
        Ok(())
    }

    /// Send a message on the socket shared by `protocol`'s subscribers.
    pub fn send(&self, protocol: &ProtocolName, message: RawMessage) -> Result<()> {
        self.inner.registry.send(protocol, message)
    }

    /// Number of open subscriptions to `protocol`.
    pub fn subscriber_count(&self, protocol: &ProtocolName) -> usize {
        self.entries().get(protocol).map_or(0, Vec::len)
    }

    /// Whether `protocol` currently has an entry (and thus a socket).
    pub fn is_active(&self, protocol: &ProtocolName) -> bool {
        self.entries().contains_key(protocol)
    }

    /// Protocols with at least one subscriber.
    pub fn active_protocols(&self) -> Vec<ProtocolName> {
        self.entries().keys().cloned().collect()
    }

    pub fn status_board(&self) -> StatusBoard {
        self.inner.registry.status_board()
    }

    /// Close every socket, keeping all subscriptions attached.
    pub fn disconnect_all(&self) {
        self.inner.registry.disconnect_all();
    }

    /// Reopen every subscribed protocol whose socket is down.
    pub fn reconnect_all(&self) -> Vec<ProtocolName> {
        self.inner.registry.reconnect_all()
    }

    pub fn is_all_disconnected(&self) -> bool {
        self.inner.registry.is_all_disconnected()
    }

    /// Remove a subscriber; closes the socket when it was the last one.
    pub(crate) fn close_record(&self, record: &Arc<SubscriberRecord>) {
        if record.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let protocol = &record.protocol;
        let remaining = {
            let mut entries = self.entries();
            let Some(subscribers) = entries.get_mut(protocol) else {
                warn!(%protocol, subscriber = record.id, "Closing subscriber with no entry");
                return;
            };
            subscribers.retain(|other| !Arc::ptr_eq(other, record));
            let remaining = subscribers.len();
            if remaining == 0 {
                entries.remove(protocol);
                self.inner.registry.close(protocol);
            } else {
                self.inner.registry.set_client_count(protocol, remaining);
            }
            remaining
        };

        debug!(%protocol, subscriber = record.id, remaining, "Unsubscribed");
    }

    fn snapshot(&self, protocol: &ProtocolName) -> Vec<Arc<SubscriberRecord>> {
        self.entries().get(protocol).cloned().unwrap_or_default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ProtocolName, Vec<Arc<SubscriberRecord>>>> {
        self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("registry", &self.inner.registry)
            .field("protocols", &self.entries().len())
            .finish()
    }
}
