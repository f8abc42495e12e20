//! Subscriptions exposed as async streams

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::ThrottleExt;
use crate::closeable::Closeable;
use crate::subscription::{Multiplexer, SubscribeOptions, Subscription};
use crate::types::{Payload, ProtocolName, UpdateRate};
use crate::Result;

/// How a telemetry stream wants its payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Decoded JSON (state protocols)
    #[default]
    Json,
    /// Bytes as received (camera images, legacy pipe-delimited text)
    Raw,
}

/// A protocol subscription delivered as a [`Stream`] of payloads.
///
/// Dropping or closing the stream leaves the protocol. The stream ends once
/// its subscription is closed, including when the multiplexer closed it.
pub struct TelemetryStream {
    subscription: Subscription,
    payloads: BoxStream<'static, Payload>,
}

impl TelemetryStream {
    /// Subscribe to `protocol` and stream its payloads at `rate`.
    ///
    /// A capped rate uses a tokio timer, so it must be opened inside a
    /// runtime.
    pub fn open(
        multiplexer: &Multiplexer,
        protocol: impl Into<ProtocolName>,
        format: PayloadFormat,
        rate: UpdateRate,
    ) -> Result<Self> {
        let protocol = protocol.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = move |payload: &Payload| {
            tx.send(payload.clone()).map_err(|_| anyhow::anyhow!("telemetry stream receiver is gone"))
        };
        let options = match format {
            PayloadFormat::Json => SubscribeOptions::json(forward),
            PayloadFormat::Raw => SubscribeOptions::raw(forward),
        };
        let subscription = multiplexer.subscribe(protocol.clone(), options)?;

        let payloads = UnboundedReceiverStream::new(rx);
        let payloads = match rate.throttle_interval() {
            Some(interval) => payloads.throttle(interval).boxed(),
            None => payloads.boxed(),
        };

        debug!(%protocol, ?format, ?rate, "Telemetry stream opened");
        Ok(Self { subscription, payloads })
    }

    pub fn protocol(&self) -> &ProtocolName {
        self.subscription.protocol()
    }

    /// Send a message on the stream's protocol.
    pub fn send(&self, message: impl Into<crate::types::RawMessage>) -> Result<()> {
        self.subscription.send(message)
    }

    pub fn close(&self) {
        self.subscription.close();
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_closed()
    }
}

impl Stream for TelemetryStream {
    type Item = Payload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.payloads.poll_next_unpin(cx) {
            Poll::Pending if self.subscription.is_closed() => Poll::Ready(None),
            other => other,
        }
    }
}

impl Closeable for TelemetryStream {
    fn close(&self) {
        TelemetryStream::close(self);
    }
}

impl std::fmt::Debug for TelemetryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStream").field("subscription", &self.subscription).finish()
    }
}
