use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::protocol_constants::DEFAULT_CAST_PORT;

bitflags! {
    /// Device capability flags advertised in the `ca` TXT record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        const VIDEO_OUT = 1 << 0;
        const VIDEO_IN = 1 << 1;
        const AUDIO_OUT = 1 << 2;
        const AUDIO_IN = 1 << 3;
        const DEV_MODE = 1 << 4;
        const MULTIZONE_GROUP = 1 << 5;
    }
}

impl Serialize for Capabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for Capabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

/// Receiver volume. Every field is optional because status updates are partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_interval: Option<f64>,
}

impl Volume {
    /// Overwrites only the fields present in `update`.
    pub fn merge(&mut self, update: &Volume) {
        if update.level.is_some() {
            self.level = update.level;
        }
        if update.muted.is_some() {
            self.muted = update.muted;
        }
        if update.control_type.is_some() {
            self.control_type.clone_from(&update.control_type);
        }
        if update.step_interval.is_some() {
            self.step_interval = update.step_interval;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub name: String,
}

/// An application running on a receiver, as reported in `RECEIVER_STATUS`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiverApplication {
    pub app_id: String,
    pub session_id: String,
    pub transport_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    pub is_idle_screen: bool,
    pub namespaces: Vec<NamespaceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universal_app_id: Option<String>,
}

/// Receiver status as last reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications: Option<Vec<ReceiverApplication>>,
    #[serde(default)]
    pub volume: Volume,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active_input: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_stand_by: Option<bool>,
}

impl ReceiverStatus {
    /// Merges a partial update into this status.
    ///
    /// Applications are replaced wholesale (a missing list means nothing is
    /// running); volume is merged field by field; flags keep their previous
    /// value unless the update carries one.
    pub fn merge(&mut self, update: ReceiverStatus) {
        self.applications = update.applications;
        self.volume.merge(&update.volume);
        if update.is_active_input.is_some() {
            self.is_active_input = update.is_active_input;
        }
        if update.is_stand_by.is_some() {
            self.is_stand_by = update.is_stand_by;
        }
    }

    pub fn applications(&self) -> &[ReceiverApplication] {
        self.applications.as_deref().unwrap_or_default()
    }

    /// First non-idle application with the given app id.
    pub fn find_application(&self, app_id: &str) -> Option<&ReceiverApplication> {
        self.applications()
            .iter()
            .find(|app| app.app_id == app_id && !app.is_idle_screen)
    }

    /// First application that is not the idle screen (backdrop).
    pub fn active_application(&self) -> Option<&ReceiverApplication> {
        self.applications().iter().find(|app| !app.is_idle_screen)
    }
}

/// A discovered (or caller-supplied) Cast receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverDevice {
    pub id: String,
    pub friendly_name: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReceiverStatus>,
}

fn default_port() -> u16 {
    DEFAULT_CAST_PORT
}

impl ReceiverDevice {
    /// True when discovery-relevant fields differ (status is ignored).
    #[must_use]
    pub fn metadata_differs(&self, other: &ReceiverDevice) -> bool {
        self.friendly_name != other.friendly_name
            || self.model_name != other.model_name
            || self.host != other.host
            || self.port != other.port
            || self.capabilities != other.capabilities
    }
}
