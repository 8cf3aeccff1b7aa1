//! Bridge configuration.
//!
//! [`Config`] holds every tunable the core library reads. The binary loads it
//! from YAML and layers environment and CLI overrides on top; every field has
//! a default so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_SENDER_ID, GOOGLECAST_SERVICE_TYPE, HEARTBEAT_INTERVAL, MONITOR_SENDER_ID,
    NATIVE_MAX_MESSAGE_LENGTH,
};

/// Configuration for receiver discovery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Enable mDNS browsing. When disabled, `bridge:startDiscovery` only
    /// replays devices already in the registry.
    pub enabled: bool,

    /// DNS-SD service type to browse.
    pub service_type: String,
}

impl DiscoveryConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.service_type.ends_with(".local.") {
            return Err(format!(
                "service_type must be fully qualified (ending in \".local.\"), got {:?}",
                self.service_type
            ));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_type: GOOGLECAST_SERVICE_TYPE.to_string(),
        }
    }
}

/// Configuration for the Cast bridge.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Daemon
    /// Port for the local WebSocket daemon.
    pub preferred_port: u16,

    // Cast transport
    /// Interval between heartbeat `PING`s (milliseconds). Three silent
    /// intervals end the connection.
    pub heartbeat_interval_ms: u64,

    /// TCP + TLS connect timeout (milliseconds).
    pub connect_timeout_ms: u64,

    /// Time allowed between `LAUNCH` and the confirming status (milliseconds).
    pub launch_timeout_ms: u64,

    /// Sender id used by sessions.
    pub session_source_id: String,

    /// Sender id used by status monitors.
    pub monitor_source_id: String,

    // Extension channel
    /// Largest inbound native-messaging frame accepted (bytes).
    pub max_native_message_length: usize,

    /// Capacity of the discovery/status event broadcast channel.
    pub event_channel_capacity: usize,

    // Discovery
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first value that would cause runtime issues.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be >= 1".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be >= 1".to_string());
        }
        if self.launch_timeout_ms == 0 {
            return Err("launch_timeout_ms must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.max_native_message_length == 0 {
            return Err("max_native_message_length must be >= 1".to_string());
        }
        if self.session_source_id.is_empty() || self.monitor_source_id.is_empty() {
            return Err("sender source ids must not be empty".to_string());
        }
        self.discovery.validate()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 9556,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            connect_timeout_ms: 10_000,
            launch_timeout_ms: 30_000,
            session_source_id: DEFAULT_SENDER_ID.to_string(),
            monitor_source_id: MONITOR_SENDER_ID.to_string(),
            max_native_message_length: NATIVE_MAX_MESSAGE_LENGTH,
            event_channel_capacity: 100,
            discovery: DiscoveryConfig::default(),
        }
    }
}
