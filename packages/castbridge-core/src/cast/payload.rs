//! JSON payloads carried on the well-known Cast namespaces.
//!
//! Every payload is a JSON object with a `type` discriminator, which maps
//! directly onto serde's internally tagged enums.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol_constants::USER_AGENT;
use crate::receiver::{ReceiverStatus, Volume};

// ─────────────────────────────────────────────────────────────────────────────
// urn:x-cast:com.google.cast.tp.connection
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionMessage {
    #[serde(rename_all = "camelCase")]
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_agent: Option<String>,
        #[serde(default)]
        conn_type: u32,
    },
    Close,
}

impl ConnectionMessage {
    /// A strong (`connType: 0`) connection request.
    pub fn connect() -> Self {
        Self::Connect {
            user_agent: Some(USER_AGENT.to_string()),
            conn_type: 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// urn:x-cast:com.google.cast.tp.heartbeat
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatMessage {
    Ping,
    Pong,
}

// ─────────────────────────────────────────────────────────────────────────────
// urn:x-cast:com.google.cast.receiver
// ─────────────────────────────────────────────────────────────────────────────

/// Volume change request. Either field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VolumeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// Requests sent to the platform receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiverRequest {
    #[serde(rename_all = "camelCase")]
    Launch { app_id: String, request_id: u32 },
    #[serde(rename_all = "camelCase")]
    Stop { session_id: String, request_id: u32 },
    #[serde(rename_all = "camelCase")]
    GetStatus { request_id: u32 },
    #[serde(rename_all = "camelCase")]
    SetVolume { volume: VolumeRequest, request_id: u32 },
}

impl ReceiverRequest {
    #[must_use]
    pub fn request_id(&self) -> u32 {
        match self {
            Self::Launch { request_id, .. }
            | Self::Stop { request_id, .. }
            | Self::GetStatus { request_id }
            | Self::SetVolume { request_id, .. } => *request_id,
        }
    }
}

/// Messages the platform receiver sends back. Unknown types deserialize as
/// [`ReceiverResponse::Other`] so they can be ignored without an error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiverResponse {
    #[serde(rename_all = "camelCase")]
    ReceiverStatus {
        #[serde(default)]
        request_id: Option<u32>,
        status: ReceiverStatus,
    },
    #[serde(rename_all = "camelCase")]
    LaunchError {
        #[serde(default)]
        request_id: Option<u32>,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    InvalidRequest {
        #[serde(default)]
        request_id: Option<u32>,
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl ReceiverResponse {
    /// Parses a receiver payload, folding anything unparseable into `Other`.
    pub fn parse(payload: Value) -> Self {
        match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(e) => {
                log::debug!("[Receiver] Ignoring unparseable receiver payload: {}", e);
                Self::Other
            }
        }
    }

    #[must_use]
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Self::ReceiverStatus { request_id, .. }
            | Self::LaunchError { request_id, .. }
            | Self::InvalidRequest { request_id, .. } => *request_id,
            Self::Other => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// urn:x-cast:com.google.cast.media
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaRequest {
    #[serde(rename_all = "camelCase")]
    GetStatus { request_id: u32 },
}

/// Media status is relayed to the extension untouched, so entries stay raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaResponse {
    #[serde(rename_all = "camelCase")]
    MediaStatus {
        #[serde(default)]
        request_id: Option<u32>,
        #[serde(default)]
        status: Vec<Value>,
    },
    #[serde(other)]
    Other,
}

/// Convenience used when a caller only wants the level/mute pair of a status.
impl From<&Volume> for VolumeRequest {
    fn from(volume: &Volume) -> Self {
        Self {
            level: volume.level,
            muted: volume.muted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn launch_serializes_with_camel_case_fields() {
        let launch = ReceiverRequest::Launch {
            app_id: "CC1AD845".into(),
            request_id: 1,
        };
        assert_eq!(
            serde_json::to_value(&launch).unwrap(),
            json!({"type": "LAUNCH", "appId": "CC1AD845", "requestId": 1})
        );
    }

    #[test]
    fn set_volume_omits_missing_fields() {
        let request = ReceiverRequest::SetVolume {
            volume: VolumeRequest {
                level: Some(0.5),
                muted: None,
            },
            request_id: 7,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "SET_VOLUME", "volume": {"level": 0.5}, "requestId": 7})
        );
    }

    #[test]
    fn close_with_extra_fields_parses() {
        let close: ConnectionMessage =
            serde_json::from_value(json!({"type": "CLOSE", "reasonCode": 5})).unwrap();
        assert_eq!(close, ConnectionMessage::Close);
    }

    #[test]
    fn receiver_status_response_parses() {
        let response = ReceiverResponse::parse(json!({
            "type": "RECEIVER_STATUS",
            "requestId": 1,
            "status": {
                "applications": [{
                    "appId": "CC1AD845",
                    "sessionId": "S1",
                    "transportId": "T1",
                    "displayName": "Default Media Receiver",
                    "isIdleScreen": false,
                    "namespaces": [{"name": "urn:x-cast:com.google.cast.media"}]
                }],
                "volume": {"level": 0.4, "muted": false}
            }
        }));
        let ReceiverResponse::ReceiverStatus { request_id, status } = response else {
            panic!("expected receiver status");
        };
        assert_eq!(request_id, Some(1));
        let app = status.find_application("CC1AD845").unwrap();
        assert_eq!(app.transport_id, "T1");
        assert_eq!(status.volume.level, Some(0.4));
    }

    #[test]
    fn unknown_receiver_type_is_other() {
        assert_eq!(
            ReceiverResponse::parse(json!({"type": "SOMETHING_NEW"})),
            ReceiverResponse::Other
        );
        assert_eq!(ReceiverResponse::parse(json!([1, 2])), ReceiverResponse::Other);
    }
}
