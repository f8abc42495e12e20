//! Real-time data subscription and settings synchronisation for humanoid
//! robot operator consoles.
//!
//! Round Table talks to a robot over one websocket per *protocol*: a control
//! channel carrying the robot's actions, settings and FSM descriptions, and
//! any number of telemetry channels (camera, walk state, timing, ...).
//!
//! # Features
//!
//! - **Shared sockets**: many subscribers per protocol, one physical socket
//! - **Settings mirror**: typed, path-addressed settings kept in sync with the robot
//! - **Deferred lookups**: ask for settings before the robot has sent them
//! - **Streams**: telemetry as `futures::Stream`, optionally rate-capped
//!
//! # Architecture
//!
//! - [`socket::SocketRegistry`] owns one socket per protocol and its status indicator
//! - [`subscription::Multiplexer`] fans messages out to [`subscription::Subscription`]s
//! - [`control::ControlClient`] mirrors the robot's catalog over the control protocol
//! - [`driver::Driver`] runs the event loop that feeds socket events to the multiplexer
//!
//! [`RoundTable`] wires all of them together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use round_table::{ConsoleConfig, RoundTable};
//! use round_table::stream::PayloadFormat;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> round_table::Result<()> {
//!     let config = ConsoleConfig::from_yaml_str("endpoint:\n  host: robot.local\n")?;
//!     let console = RoundTable::open(&config)?;
//!
//!     console.control().with_setting("vision.ball.hue", |setting| {
//!         if let Some(setting) = setting {
//!             setting.track(|value| println!("hue is now {value}"));
//!         }
//!     });
//!
//!     let mut walk = console.telemetry("Walk", PayloadFormat::Json)?;
//!     while let Some(state) = walk.next().await {
//!         println!("{:?}", state.as_json());
//!     }
//!     Ok(())
//! }
//! ```

pub mod closeable;
pub mod config;
pub mod control;
pub mod driver;
mod error;
pub mod logging;
pub mod socket;
pub mod stream;
pub mod subscription;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Core exports
pub use closeable::{CallbackHandle, Closeable, CloseableSet};
pub use config::{ConsoleConfig, EndpointConfig};
pub use control::{Action, ControlClient, ControlMessage, FsmDescription, Setting, SettingKind};
pub use error::*;
pub use subscription::{Multiplexer, SubscribeOptions, Subscription};
pub use types::*;

use futures::Stream;
use std::sync::Arc;
use tracing::{info, warn};

use driver::{Driver, DriverHandle};
use socket::{Connector, EventSource, SocketRegistry, WebSocketConnector, event_channel};
use stream::{PayloadFormat, TelemetryStream};

/// The console's connection to one robot.
///
/// Owns the socket registry, the multiplexer and the control client, and
/// usually the driver task. Dropping it stops the driver and closes the
/// control subscription.
pub struct RoundTable {
    multiplexer: Multiplexer,
    control: ControlClient,
    telemetry_rate: UpdateRate,
    driver: Option<DriverHandle>,
}

impl RoundTable {
    /// Connect to the robot described by `config` over websockets.
    ///
    /// Must be called inside a tokio runtime; the driver task is spawned on
    /// it.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use round_table::{ConsoleConfig, EndpointConfig, RoundTable};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> round_table::Result<()> {
    /// let config = ConsoleConfig { endpoint: EndpointConfig::new("10.0.0.5"), ..Default::default() };
    /// let console = RoundTable::open(&config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(config: &ConsoleConfig) -> Result<Self> {
        config.validate()?;
        let url = config.endpoint.websocket_url();
        let (mut console, events) = Self::with_connector(url, Arc::new(WebSocketConnector::new()))?;
        console.telemetry_rate = config.telemetry_rate;
        console.drive(events)?;
        Ok(console)
    }

    /// Build the same graph over any transport, without a driver.
    ///
    /// The caller pumps the returned [`EventSource`] itself, either through
    /// [`drive`](Self::drive) or by handing events to
    /// [`Multiplexer::dispatch`].
    pub fn with_connector(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<(Self, EventSource)> {
        let url = url.into();
        let (sink, events) = event_channel();
        let registry = SocketRegistry::new(url.clone(), connector, sink);
        let multiplexer = Multiplexer::new(registry);
        let control = ControlClient::new(multiplexer.clone());
        control.connect(|error| warn!(error = %error, "Control socket error"))?;

        info!(%url, "Round Table console created");
        Ok((Self { multiplexer, control, telemetry_rate: UpdateRate::Native, driver: None }, events))
    }

    /// Spawn the driver task over `events`. Replaces a previous driver.
    pub fn drive(&mut self, events: EventSource) -> Result<()> {
        self.driver = Some(Driver::spawn(self.multiplexer.clone(), events)?);
        Ok(())
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    pub fn registry(&self) -> &SocketRegistry {
        self.multiplexer.registry()
    }

    pub fn control(&self) -> &ControlClient {
        &self.control
    }

    /// Subscribe to a telemetry protocol directly.
    pub fn subscribe(
        &self,
        protocol: impl Into<ProtocolName>,
        options: SubscribeOptions,
    ) -> Result<Subscription> {
        self.multiplexer.subscribe(protocol, options)
    }

    /// Stream a telemetry protocol at the configured rate.
    pub fn telemetry(
        &self,
        protocol: impl Into<ProtocolName>,
        format: PayloadFormat,
    ) -> Result<TelemetryStream> {
        TelemetryStream::open(&self.multiplexer, protocol, format, self.telemetry_rate)
    }

    pub fn status_board(&self) -> StatusBoard {
        self.registry().status_board()
    }

    /// Status board snapshots, starting with the current one.
    pub fn status_updates(&self) -> impl Stream<Item = StatusBoard> + 'static {
        self.registry().status_updates()
    }

    pub fn disconnect_all(&self) {
        self.multiplexer.disconnect_all();
    }

    pub fn reconnect_all(&self) -> Vec<ProtocolName> {
        self.multiplexer.reconnect_all()
    }

    pub fn is_all_disconnected(&self) -> bool {
        self.multiplexer.is_all_disconnected()
    }

    /// Stop the driver and close the control subscription.
    pub async fn shutdown(mut self) {
        self.control.disconnect();
        if let Some(driver) = self.driver.take() {
            driver.shutdown().await;
        }
    }
}

impl std::fmt::Debug for RoundTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundTable")
            .field("multiplexer", &self.multiplexer)
            .field("control", &self.control)
            .field("driver", &self.driver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MOCK_URL, MockConnector};
    use serde_json::json;

    #[test]
    fn with_connector_connects_control() {
        let connector = MockConnector::new();
        let (console, _events) = RoundTable::with_connector(MOCK_URL, Arc::new(connector.clone())).unwrap();
        assert!(console.control().is_connected());
        assert_eq!(connector.live(types::protocols::CONTROL).len(), 1);
        assert_eq!(console.registry().url(), MOCK_URL);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let mut config = ConsoleConfig::default();
        config.endpoint.host.clear();
        assert!(matches!(RoundTable::open(&config), Err(ConsoleError::Config { .. })));
    }

    #[tokio::test]
    async fn driven_console_syncs_settings() {
        let connector = MockConnector::new();
        let (mut console, events) = RoundTable::with_connector(MOCK_URL, Arc::new(connector.clone())).unwrap();
        console.drive(events).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        console.control().with_setting("motion.speed", move |setting| {
            let _ = tx.send(setting.map(|s| s.value()));
        });

        let socket = connector.latest(types::protocols::CONTROL).unwrap();
        socket.open();
        socket.push_json(&json!({
            "type": "sync",
            "actions": [],
            "settings": [{"path": "motion.speed", "type": "double", "value": 0.5}],
            "fsms": []
        }));

        assert_eq!(rx.await.unwrap(), Some(json!(0.5)));
        console.shutdown().await;
        assert!(connector.live(types::protocols::CONTROL).is_empty());
    }
}
