//! Bridge process configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables, then by command-line flags (applied in `main.rs`).

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

/// Which channel the extension uses to reach the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Browser native messaging over stdin/stdout.
    Native,
    /// Local WebSocket daemon.
    Daemon,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// Bridge configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Extension channel.
    /// Override: `CASTBRIDGE_MODE`
    pub mode: Mode,

    /// Port for the WebSocket daemon.
    /// Override: `CASTBRIDGE_BIND_PORT`
    pub bind_port: u16,

    /// Interval between Cast heartbeat pings, in milliseconds.
    /// Override: `CASTBRIDGE_HEARTBEAT_INTERVAL_MS`
    pub heartbeat_interval_ms: u64,

    /// TCP and TLS connect timeout, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time allowed for a receiver to confirm a launch, in milliseconds.
    pub launch_timeout_ms: u64,

    /// Enable mDNS discovery of receivers.
    pub discovery_mdns: bool,

    /// Largest inbound native messaging frame, in bytes.
    pub max_native_message_length: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let core = castbridge_core::Config::default();
        Self {
            mode: Mode::Native,
            bind_port: core.preferred_port,
            heartbeat_interval_ms: core.heartbeat_interval_ms,
            connect_timeout_ms: core.connect_timeout_ms,
            launch_timeout_ms: core.launch_timeout_ms,
            discovery_mdns: core.discovery.enabled,
            max_native_message_length: core.max_native_message_length,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up through `var`. Unparseable values are
    /// ignored with a warning.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("CASTBRIDGE_MODE") {
            match val.parse() {
                Ok(mode) => self.mode = mode,
                Err(e) => log::warn!("Ignoring CASTBRIDGE_MODE={:?}: {}", val, e),
            }
        }

        if let Some(val) = var("CASTBRIDGE_BIND_PORT") {
            match val.parse() {
                Ok(port) => self.bind_port = port,
                Err(_) => log::warn!("Ignoring CASTBRIDGE_BIND_PORT={:?}", val),
            }
        }

        if let Some(val) = var("CASTBRIDGE_HEARTBEAT_INTERVAL_MS") {
            match val.parse() {
                Ok(ms) => self.heartbeat_interval_ms = ms,
                Err(_) => log::warn!("Ignoring CASTBRIDGE_HEARTBEAT_INTERVAL_MS={:?}", val),
            }
        }
    }

    /// Converts to castbridge-core's Config type.
    pub fn to_core_config(&self) -> castbridge_core::Config {
        let mut config = castbridge_core::Config {
            preferred_port: self.bind_port,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            launch_timeout_ms: self.launch_timeout_ms,
            max_native_message_length: self.max_native_message_length,
            ..Default::default()
        };
        config.discovery.enabled = self.discovery_mdns;
        config
    }
}
