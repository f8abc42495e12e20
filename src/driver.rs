//! Driver task that feeds socket events to the multiplexer

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::socket::EventSource;
use crate::subscription::Multiplexer;
use crate::{ConsoleError, Result};

/// Handle to a running driver task.
///
/// Dropping the handle stops the task.
pub struct DriverHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Token that stops the driver when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the driver to stop after the event it is processing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the driver and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Driver task failed: {}", e);
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Driver runs the console's event loop
///
/// One task pops socket events and dispatches them through the multiplexer,
/// so every subscriber callback runs on that task, one event at a time.
pub struct Driver;

impl Driver {
    /// Spawn the event loop on the current tokio runtime.
    pub fn spawn(multiplexer: Multiplexer, events: EventSource) -> Result<DriverHandle> {
        let runtime = Handle::try_current().map_err(|e| {
            ConsoleError::connection_failed_with_source(
                multiplexer.registry().url(),
                "the driver needs a tokio runtime",
                Box::new(e),
            )
        })?;

        let cancel = CancellationToken::new();
        let cancel_loop = cancel.clone();
        let task = runtime.spawn(async move {
            Self::event_loop(multiplexer, events, cancel_loop).await;
        });

        Ok(DriverHandle { cancel, task: Some(task) })
    }

    /// Event loop - dispatches events until cancelled or every sender is gone
    async fn event_loop(multiplexer: Multiplexer, mut events: EventSource, cancel: CancellationToken) {
        info!("Driver event loop started");
        let mut event_count = 0u64;
        let mut error_count = 0u64;

        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Driver cancelled");
                    break;
                }
                envelope = events.recv() => envelope,
            };

            let Some(envelope) = envelope else {
                debug!("Event source closed, shutting down");
                break;
            };

            event_count += 1;
            trace!(
                "Event {}: protocol={}, socket={}",
                event_count, envelope.protocol, envelope.socket_id
            );

            // A failing subscriber is already closed; keep serving the others
            if let Err(e) = multiplexer.dispatch(envelope) {
                error_count += 1;
                error!("Dispatch error ({} so far): {}", error_count, e);
            }
        }

        info!(
            "Driver event loop ended (processed {} events, {} errors)",
            event_count, error_count
        );
    }
}
