//! Configuration for ringdht components
//!
//! Values come from an optional `ringdht.toml`, then from `RINGDHT_*`
//! environment variables (nested keys separated by `__`, e.g.
//! `RINGDHT_NODE__REGISTER_TIMEOUT_MS=2000`). CLI flags override both.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ringdht.toml";

/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level
    pub log_level: String,

    /// Coordinator-specific config
    pub coordinator: CoordinatorConfig,

    /// Node-specific config
    pub node: NodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            coordinator: CoordinatorConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default file and environment. A missing file means
    /// defaults; a file that exists but does not parse or validate is an error.
    pub fn load() -> crate::Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file (optional) plus environment overrides
    pub fn load_from(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("RINGDHT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.coordinator.validate()?;
        self.node.validate()
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// UDP bind address
    pub bind_addr: SocketAddr,

    /// Dataset field used as the item key when present
    pub key_field: String,

    /// Receive buffer / send limit for one datagram
    pub max_datagram_size: usize,

    /// Dataset loaded at startup (CSV, or JSON Lines for `.jsonl`)
    pub dataset: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            key_field: "EVENT_ID".to_string(),
            max_datagram_size: MAX_UDP_PAYLOAD,
            dataset: None,
        }
    }
}

impl CoordinatorConfig {
    fn validate(&self) -> crate::Result<()> {
        if self.key_field.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "coordinator.key_field cannot be empty".into(),
            ));
        }
        validate_datagram_size(self.max_datagram_size)
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// UDP bind address; its port is the one announced to the coordinator.
    /// A wildcard address is advertised as loopback, so multi-host rings
    /// need a concrete interface address here.
    pub bind_addr: SocketAddr,

    /// Where the coordinator listens
    pub coordinator_addr: SocketAddr,

    /// How long `register` waits for `set_id`
    pub register_timeout_ms: u64,

    /// Receive buffer / send limit for one datagram
    pub max_datagram_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            coordinator_addr: CoordinatorConfig::default().bind_addr,
            register_timeout_ms: 5_000,
            max_datagram_size: MAX_UDP_PAYLOAD,
        }
    }
}

impl NodeConfig {
    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.register_timeout_ms)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.register_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "node.register_timeout_ms must be positive".into(),
            ));
        }
        validate_datagram_size(self.max_datagram_size)
    }
}

fn validate_datagram_size(size: usize) -> crate::Result<()> {
    if size == 0 || size > MAX_UDP_PAYLOAD {
        return Err(crate::Error::InvalidConfig(format!(
            "max_datagram_size must be in 1..={}, got {}",
            MAX_UDP_PAYLOAD, size
        )));
    }
    Ok(())
}
