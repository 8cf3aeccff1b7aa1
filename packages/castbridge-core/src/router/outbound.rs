//! Delivery of router output to one extension connection.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::message::{subjects, BridgeMessage};
use crate::events::{BroadcastEvent, DiscoveryEvent, EventEmitter, StatusEvent};

/// Sending half of a connection's outgoing queue.
///
/// Values are written by the connection's single writer task, so frames
/// never interleave.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Value>,
}

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    /// Sends an enveloped message.
    pub fn message(&self, message: BridgeMessage) {
        match serde_json::to_value(&message) {
            Ok(value) => self.raw(value),
            Err(e) => log::warn!("[Router] Failed to encode {}: {}", message.subject, e),
        }
    }

    /// Sends `{subject, data, _id?}` with `data` serialized from `data`.
    pub fn send<T: Serialize>(&self, subject: &str, data: &T, id: Option<&str>) {
        match serde_json::to_value(data) {
            Ok(data) => self.message(
                BridgeMessage::new(subject, data).with_id(id.map(str::to_string)),
            ),
            Err(e) => log::warn!("[Router] Failed to encode {} payload: {}", subject, e),
        }
    }

    /// Sends a value outside the envelope.
    pub fn raw(&self, value: Value) {
        if self.tx.send(value).is_err() {
            log::trace!("[Router] Connection writer is gone; dropping output");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn broadcast(&self, event: BroadcastEvent, id: Option<&str>) {
        match event {
            BroadcastEvent::Discovery(event) => self.discovery(event, id),
            BroadcastEvent::Status(event) => self.status(event, id),
        }
    }

    fn discovery(&self, event: DiscoveryEvent, id: Option<&str>) {
        match event {
            DiscoveryEvent::DeviceUp { device } => self.send(
                subjects::DEVICE_UP,
                &json!({ "deviceId": device.id, "deviceInfo": device }),
                id,
            ),
            DiscoveryEvent::DeviceDown { device_id } => {
                self.send(subjects::DEVICE_DOWN, &json!({ "deviceId": device_id }), id)
            }
        }
    }

    fn status(&self, event: StatusEvent, id: Option<&str>) {
        match event {
            StatusEvent::ReceiverStatusUpdated { device_id, status } => self.send(
                subjects::RECEIVER_STATUS_UPDATED,
                &json!({ "deviceId": device_id, "status": status }),
                id,
            ),
            StatusEvent::MediaStatusUpdated { device_id, status } => self.send(
                subjects::MEDIA_STATUS_UPDATED,
                &json!({ "deviceId": device_id, "status": status }),
                id,
            ),
        }
    }
}

/// Emitter writing straight to one connection, optionally tagging every
/// message with an instance `_id`.
pub struct ConnectionEmitter {
    outbound: Outbound,
    instance_id: Option<String>,
}

impl ConnectionEmitter {
    pub fn new(outbound: Outbound, instance_id: Option<String>) -> Self {
        Self {
            outbound,
            instance_id,
        }
    }
}

impl EventEmitter for ConnectionEmitter {
    fn emit_discovery(&self, event: DiscoveryEvent) {
        self.outbound.discovery(event, self.instance_id.as_deref());
    }

    fn emit_status(&self, event: StatusEvent) {
        self.outbound.status(event, self.instance_id.as_deref());
    }
}
