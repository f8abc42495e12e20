//! Console configuration loaded from YAML
//!
//! ```yaml
//! endpoint:
//!   host: robot.local
//!   port: 8080
//! telemetry-rate: Native
//! log-filter: round_table=debug
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::logging::DEFAULT_LOG_FILTER;
use crate::types::UpdateRate;
use crate::{ConsoleError, Result};

/// Port the robot serves its websocket on.
pub const DEFAULT_PORT: u16 = 8080;

/// Where the robot's websocket server lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Use `wss://`
    pub secure: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: DEFAULT_PORT, secure: false }
    }
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Self::default() }
    }

    /// URL every protocol socket connects to.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Endpoint for a console served from `page_url`.
    ///
    /// The robot is the host that served the page, on the default port. A
    /// `host` query parameter overrides the host.
    pub fn from_page_url(page_url: &str) -> Result<Self> {
        let url = Url::parse(page_url).map_err(|e| ConsoleError::invalid_endpoint(page_url, format!("{e}")))?;

        // Query values arrive percent-decoded
        let override_host = url
            .query_pairs()
            .find(|(key, _)| key == "host")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());

        let host = match override_host {
            Some(host) => host,
            None => url
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| ConsoleError::invalid_endpoint(page_url, "page URL has no host"))?,
        };

        Ok(Self { host, port: DEFAULT_PORT, secure: url.scheme() == "https" })
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConsoleError::Config { details: "endpoint host is empty".to_string() });
        }
        if self.port == 0 {
            return Err(ConsoleError::Config { details: "endpoint port must be non-zero".to_string() });
        }
        Ok(())
    }
}

/// Top-level console configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub endpoint: EndpointConfig,
    /// Default rate for telemetry streams
    pub telemetry_rate: UpdateRate,
    /// `tracing` filter directives; `RUST_LOG` takes precedence
    pub log_filter: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            telemetry_rate: UpdateRate::Native,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Parse and validate YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ConsoleConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ConsoleError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()
    }
}
