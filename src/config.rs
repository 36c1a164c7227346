//! Configuration.
//!
//! [`Config`] is everything the middleware needs: where the IoT hub lives
//! and the key to present to it. [`ServiceConfig`] wraps it with what the
//! bundled binary needs to host the middleware.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Middleware configuration. Set once at construction, read-only afterwards.
///
/// Field names match the keys the host passes in (`IotHubUrl`,
/// `SubscriptionKey`).
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base URL of the IoT hub, without a trailing path.
    #[serde(rename = "IotHubUrl")]
    pub iot_hub_url: String,

    /// Sent to the hub in the `X-Subscription-Key` header.
    #[serde(rename = "SubscriptionKey")]
    pub subscription_key: String,
}

impl Config {
    pub fn new(iot_hub_url: impl Into<String>, subscription_key: impl Into<String>) -> Self {
        Self { iot_hub_url: iot_hub_url.into(), subscription_key: subscription_key.into() }
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("iot_hub_url", &self.iot_hub_url)
            .field("subscription_key", &"<redacted>")
            .finish()
    }
}

/// Configuration for the `simlink` binary.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Address to listen on.
    pub listen: SocketAddr,

    /// Route the middleware is mounted on (`POST` only).
    pub route: String,

    /// Backend base URL that requests are forwarded to once the hub accepts them.
    pub upstream: String,

    /// Default log level. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bound on the hub call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    pub middleware: Config,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_timeout_secs() -> u64 {
    crate::middleware::simulated::DEFAULT_TIMEOUT.as_secs()
}

impl ServiceConfig {
    pub fn from_toml(src: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(src).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&src)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), Error> {
        if !self.route.starts_with('/') {
            return Err(Error::config(format!("route `{}` must start with `/`", self.route)));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}
