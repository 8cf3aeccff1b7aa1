//! Bridge ↔ extension message envelope and payloads.
//!
//! Every message is `{subject, data?, _id?}`. Subjects follow an
//! `origin:topic` convention: `bridge:` and `remote:` for commands from the
//! extension, `main:` and `cast:` for events sent back to it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cast::payload::VolumeRequest;
use crate::receiver::ReceiverDevice;

/// Subject strings understood or produced by the router.
pub mod subjects {
    // Extension → bridge
    pub const GET_INFO: &str = "bridge:getInfo";
    pub const START_DISCOVERY: &str = "bridge:startDiscovery";
    pub const STOP_DISCOVERY: &str = "bridge:stopDiscovery";
    pub const CREATE_CAST_SESSION: &str = "bridge:createCastSession";
    pub const SEND_CAST_RECEIVER_MESSAGE: &str = "bridge:sendCastReceiverMessage";
    pub const SEND_CAST_SESSION_MESSAGE: &str = "bridge:sendCastSessionMessage";
    pub const STOP_CAST_SESSION: &str = "bridge:stopCastSession";
    pub const SET_CAST_RECEIVER_VOLUME: &str = "bridge:setCastReceiverVolume";
    pub const REMOTE_INITIALIZE: &str = "remote:initialize";
    pub const REMOTE_CLOSE: &str = "remote:close";

    // Bridge → extension
    pub const DEVICE_UP: &str = "main:deviceUp";
    pub const DEVICE_DOWN: &str = "main:deviceDown";
    pub const RECEIVER_STATUS_UPDATED: &str = "main:receiverDeviceStatusUpdated";
    pub const MEDIA_STATUS_UPDATED: &str = "main:receiverDeviceMediaStatusUpdated";
    pub const CAST_SESSION_CREATED: &str = "main:castSessionCreated";
    pub const CAST_SESSION_CREATE_FAILED: &str = "main:castSessionCreateFailed";
    pub const SESSION_UPDATED: &str = "cast:sessionUpdated";
    pub const SESSION_STOPPED: &str = "cast:sessionStopped";
    pub const SESSION_MESSAGE_RECEIVED: &str = "cast:sessionMessageReceived";
    pub const RECEIVER_MESSAGE_RECEIVED: &str = "cast:receiverMessageReceived";
    pub const SEND_MESSAGE_RESULT: &str = "cast:impl_sendMessage";

    /// True for `*/initialize` subjects, which create an instance.
    pub fn is_initialize(subject: &str) -> bool {
        subject
            .split_once(':')
            .is_some_and(|(_, topic)| topic == "initialize")
    }
}

/// The envelope carried by every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl BridgeMessage {
    pub fn new(subject: &str, data: Value) -> Self {
        Self {
            subject: subject.to_string(),
            data: Some(data),
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Deserializes `data` into a request type. A missing `data` is read as
    /// an empty object so all-optional requests still parse.
    pub fn parse_data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.data {
            Some(data) => T::deserialize(data),
            None => T::deserialize(&Value::Object(Default::default())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDiscoveryRequest {
    #[serde(default)]
    pub should_watch_status: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCastSessionRequest {
    pub app_id: String,
    pub receiver_device: ReceiverDevice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCastReceiverMessageRequest {
    pub session_id: String,
    pub message_data: Value,
    pub message_id: String,
}

impl SendCastReceiverMessageRequest {
    /// The receiver message as a JSON value. Stringified payloads are parsed.
    pub fn message(&self) -> Result<Value, serde_json::Error> {
        match &self.message_data {
            Value::String(text) => serde_json::from_str(text),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCastSessionMessageRequest {
    pub session_id: String,
    pub namespace: String,
    pub message_data: Value,
    pub message_id: String,
}

impl SendCastSessionMessageRequest {
    /// JSON text to put on the wire. String payloads are already encoded.
    pub fn message_text(&self) -> String {
        match &self.message_data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopCastSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCastReceiverVolumeRequest {
    pub session_id: String,
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub muted: Option<bool>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl SetCastReceiverVolumeRequest {
    pub fn volume(&self) -> VolumeRequest {
        VolumeRequest {
            level: self.level,
            muted: self.muted,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInitializeRequest {
    pub receiver_device: ReceiverDevice,
}
