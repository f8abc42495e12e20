//! Tracing subscriber setup for embedders

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{ConsoleError, Result};

/// Filter used when neither `RUST_LOG` nor the configuration sets one.
pub const DEFAULT_LOG_FILTER: &str = "round_table=info";

/// Build the filter: `RUST_LOG` wins over `configured`.
pub fn env_filter(configured: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = if configured.trim().is_empty() { DEFAULT_LOG_FILTER } else { configured };
    EnvFilter::try_new(directives).map_err(|e| ConsoleError::Logging {
        reason: format!("invalid log filter '{directives}': {e}"),
    })
}

/// Install a global fmt subscriber.
///
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init_tracing(configured: &str) -> Result<()> {
    let filter = env_filter(configured)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| ConsoleError::Logging { reason: e.to_string() })
}
