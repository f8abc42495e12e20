//! Subscription multiplexer.
//!
//! Many logical subscribers share the one physical socket a protocol has in
//! the [`SocketRegistry`](crate::socket::SocketRegistry). Per protocol the
//! multiplexer is in one of two states:
//!
//! - no entry: no subscribers and no socket
//! - active entry: at least one subscriber and exactly one socket
//!
//! The first [`Multiplexer::subscribe`] opens the socket, closing the last
//! [`Subscription`] closes it.
//!
//! Incoming messages are decoded as JSON at most once, and only if a
//! subscriber that wants JSON is reached. A handler returning an error has
//! its subscription closed before the error is returned from
//! [`Multiplexer::dispatch`]; later subscribers miss that one message.
//!
//! ```no_run
//! use round_table::subscription::SubscribeOptions;
//! # fn demo(multiplexer: &round_table::subscription::Multiplexer) -> round_table::Result<()> {
//! let subscription = multiplexer.subscribe(
//!     "Walk",
//!     SubscribeOptions::json(|payload| {
//!         println!("walk state: {:?}", payload.as_json());
//!         Ok(())
//!     }),
//! )?;
//! subscription.close();
//! # Ok(())
//! # }
//! ```

mod handle;
mod multiplexer;

#[cfg(test)]
mod tests;

pub use handle::Subscription;
pub use multiplexer::Multiplexer;

use std::fmt;
use std::sync::Arc;

use crate::types::{Payload, SocketError};

/// Callback receiving each message of a subscription.
pub type MessageHandler = Arc<dyn Fn(&Payload) -> anyhow::Result<()> + Send + Sync>;

/// Callback receiving transport errors of a subscription's socket.
pub type ErrorHandler = Arc<dyn Fn(&SocketError) + Send + Sync>;

/// How a subscriber wants its messages delivered.
#[derive(Clone)]
pub struct SubscribeOptions {
    pub(crate) on_message: MessageHandler,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) parse_json: bool,
}

impl SubscribeOptions {
    /// Deliver messages decoded as JSON.
    pub fn json<F>(handler: F) -> Self
    where
        F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { on_message: Arc::new(handler), on_error: None, parse_json: true }
    }

    /// Deliver messages exactly as received.
    pub fn raw<F>(handler: F) -> Self
    where
        F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { on_message: Arc::new(handler), on_error: None, parse_json: false }
    }

    /// Also receive transport errors.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&SocketError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Override JSON decoding.
    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("parse_json", &self.parse_json)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
