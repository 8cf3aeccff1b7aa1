//! Event system for device-level notifications.
//!
//! This module provides:
//! - [`EventEmitter`] trait for discovery and monitors to emit events
//! - [`BroadcastEventBridge`] fanning events out to every bridge connection
//! - Event types for discovery and receiver status
//!
//! Session events are not part of this system: they belong to a single
//! bridge connection and travel on that session's own channel.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;
use serde_json::Value;

use crate::receiver::{ReceiverDevice, ReceiverStatus};

/// Events broadcast to every connected bridge client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Receivers appearing or disappearing on the network.
    Discovery(DiscoveryEvent),

    /// Status reported by a monitored receiver.
    Status(StatusEvent),
}

/// Events from mDNS discovery.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiscoveryEvent {
    /// A receiver was found, or its advertised metadata changed.
    DeviceUp {
        device: ReceiverDevice,
    },
    /// A receiver stopped advertising.
    DeviceDown {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
}

/// Events from status monitors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// Merged receiver status after a `RECEIVER_STATUS` message.
    ReceiverStatusUpdated {
        #[serde(rename = "deviceId")]
        device_id: String,
        status: ReceiverStatus,
    },
    /// Media status relayed from the receiver's active application.
    MediaStatusUpdated {
        #[serde(rename = "deviceId")]
        device_id: String,
        status: Vec<Value>,
    },
}

impl StatusEvent {
    pub fn device_id(&self) -> &str {
        match self {
            Self::ReceiverStatusUpdated { device_id, .. }
            | Self::MediaStatusUpdated { device_id, .. } => device_id,
        }
    }
}
