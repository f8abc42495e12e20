//! WebSocket transport built on tokio-tungstenite

use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Once};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, http::HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Connector, Socket, SocketContext};
use crate::types::{ProtocolName, RawMessage, SocketEvent};
use crate::{ConsoleError, Result};

/// Close code reported when the peer closed without sending one.
const NO_STATUS_CODE: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Opens one websocket per protocol, using the protocol name as the
/// `Sec-WebSocket-Protocol` sub-protocol.
///
/// Each socket runs in its own task on the tokio runtime that was current
/// when [`open`](Connector::open) was called (or the handle given to
/// [`with_handle`](Self::with_handle)).
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    runtime: Option<Handle>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn socket tasks on `runtime` instead of the current runtime.
    pub fn with_handle(runtime: Handle) -> Self {
        Self { runtime: Some(runtime) }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, context: SocketContext) -> Result<Arc<dyn Socket>> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|e| {
                ConsoleError::connection_failed_with_source(
                    context.protocol.as_str(),
                    "no tokio runtime available to drive the socket",
                    Box::new(e),
                )
            })?,
        };

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let protocol = context.protocol.clone();

        debug!(%protocol, socket = %context.socket_id, url = %context.url, "Spawning websocket task");
        runtime.spawn(run_socket(context, outgoing_rx, cancel.clone()));

        Ok(Arc::new(WebSocket { protocol, outgoing: outgoing_tx, cancel }))
    }
}

/// Handle to a websocket task.
struct WebSocket {
    protocol: ProtocolName,
    outgoing: mpsc::UnboundedSender<RawMessage>,
    cancel: CancellationToken,
}

impl Socket for WebSocket {
    fn send(&self, message: RawMessage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConsoleError::send_failed(self.protocol.as_str(), "socket is closed"));
        }
        self.outgoing
            .send(message)
            .map_err(|_| ConsoleError::send_failed(self.protocol.as_str(), "socket task has exited"))
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WebSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_socket(
    context: SocketContext,
    mut outgoing: mpsc::UnboundedReceiver<RawMessage>,
    cancel: CancellationToken,
) {
    let protocol = context.protocol.clone();

    let request = match build_request(&context) {
        Ok(request) => request,
        Err(e) => {
            warn!(%protocol, error = %e, "Invalid websocket request");
            context.emit(SocketEvent::Error(e.to_string()));
            context.emit(SocketEvent::Close { code: ABNORMAL_CLOSE_CODE, reason: e.to_string() });
            return;
        }
    };

    if request.uri().scheme_str() == Some("wss") {
        install_crypto_provider();
    }

    // Outgoing messages queue in the channel until the handshake completes.
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(%protocol, "Socket closed before handshake completed");
            return;
        }
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(%protocol, error = %e, "Websocket handshake failed");
            context.emit(SocketEvent::Error(e.to_string()));
            context.emit(SocketEvent::Close { code: ABNORMAL_CLOSE_CODE, reason: e.to_string() });
            return;
        }
    };

    info!(%protocol, socket = %context.socket_id, "Websocket connected");
    context.emit(SocketEvent::Open);

    let (mut writer, mut reader) = stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%protocol, "Closing websocket");
                if let Err(e) = writer.send(tungstenite::Message::Close(None)).await {
                    trace!(%protocol, error = %e, "Close frame not delivered");
                }
                break;
            }
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                let frame = match message {
                    RawMessage::Text(text) => tungstenite::Message::Text(text.to_string().into()),
                    RawMessage::Binary(bytes) => tungstenite::Message::Binary(bytes.to_vec().into()),
                };
                if let Err(e) = writer.send(frame).await {
                    warn!(%protocol, error = %e, "Websocket send failed");
                    context.emit(SocketEvent::Error(e.to_string()));
                }
            }
            incoming = reader.next() => match incoming {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    context.emit(SocketEvent::Message(RawMessage::from(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    context.emit(SocketEvent::Message(RawMessage::from(bytes.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((NO_STATUS_CODE, String::new()));
                    context.emit(SocketEvent::Close { code, reason });
                    return;
                }
                // Ping replies are handled by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%protocol, error = %e, "Websocket read failed");
                    context.emit(SocketEvent::Error(e.to_string()));
                    context.emit(SocketEvent::Close { code: ABNORMAL_CLOSE_CODE, reason: e.to_string() });
                    return;
                }
                None => {
                    context.emit(SocketEvent::Close { code: ABNORMAL_CLOSE_CODE, reason: String::new() });
                    return;
                }
            }
        }
    }

    context.emit(SocketEvent::Close { code: 1000, reason: String::new() });
}

/// Select the rustls crypto provider once per process, before any `wss://`
/// handshake. Keeps a provider another crate already installed.
fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            debug!("rustls crypto provider already installed");
        }
    });
}

fn build_request(context: &SocketContext) -> Result<tungstenite::handshake::client::Request> {
    let mut request = context
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ConsoleError::invalid_endpoint(&context.url, e.to_string()))?;

    let protocol = HeaderValue::from_str(context.protocol.as_str())
        .map_err(|_| ConsoleError::InvalidProtocol { name: context.protocol.to_string() })?;
    request.headers_mut().insert("Sec-WebSocket-Protocol", protocol);

    Ok(request)
}
