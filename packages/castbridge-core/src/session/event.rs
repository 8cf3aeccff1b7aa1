use serde::Serialize;
use serde_json::Value;

use crate::receiver::{NamespaceEntry, ReceiverApplication, Volume};

/// Details reported when a session becomes active.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub status_text: Option<String>,
    pub namespaces: Vec<NamespaceEntry>,
    pub volume: Volume,
    pub app_id: String,
    pub display_name: String,
    pub receiver_friendly_name: String,
    pub transport_id: String,
}

impl SessionInfo {
    pub fn new(app: &ReceiverApplication, volume: &Volume, receiver_friendly_name: &str) -> Self {
        Self {
            session_id: app.session_id.clone(),
            status_text: app.status_text.clone(),
            namespaces: app.namespaces.clone(),
            volume: volume.clone(),
            app_id: app.app_id.clone(),
            display_name: app.display_name.clone(),
            receiver_friendly_name: receiver_friendly_name.to_string(),
            transport_id: app.transport_id.clone(),
        }
    }
}

/// The mutable part of a session, re-sent on every status push.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub session_id: String,
    pub status_text: Option<String>,
    pub namespaces: Vec<NamespaceEntry>,
    pub volume: Volume,
}

impl SessionUpdate {
    pub fn new(app: &ReceiverApplication, volume: &Volume) -> Self {
        Self {
            session_id: app.session_id.clone(),
            status_text: app.status_text.clone(),
            namespaces: app.namespaces.clone(),
            volume: volume.clone(),
        }
    }
}

/// Everything a session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Created(SessionInfo),
    Updated(SessionUpdate),
    Stopped {
        session_id: String,
    },
    LaunchFailed {
        app_id: String,
        reason: String,
    },
    /// Inbound message on an application namespace. `message_data` is the
    /// JSON text of the payload.
    MessageReceived {
        session_id: String,
        namespace: String,
        message_data: String,
    },
    /// Platform receiver reply echoing a request id issued through
    /// `send_receiver_message`.
    ReceiverMessage {
        session_id: String,
        request_id: u32,
        message: Value,
    },
}

impl SessionEvent {
    /// True for the events after which the session emits nothing else.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Stopped { .. } | Self::LaunchFailed { .. })
    }
}
