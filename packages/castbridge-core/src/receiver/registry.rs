use dashmap::DashMap;

use super::types::{ReceiverDevice, ReceiverStatus};

/// Outcome of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
    Unchanged,
}

/// Shared table of known receivers, keyed by device id.
///
/// Discovery owns membership; status monitors only ever merge status into
/// devices that are already present.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, ReceiverDevice>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a device. Any status already held for the device
    /// is preserved across metadata refreshes.
    pub fn upsert(&self, mut device: ReceiverDevice) -> UpsertOutcome {
        match self.devices.get_mut(&device.id) {
            Some(mut existing) => {
                if !existing.metadata_differs(&device) {
                    return UpsertOutcome::Unchanged;
                }
                if device.status.is_none() {
                    device.status = existing.status.take();
                }
                *existing = device;
                UpsertOutcome::Updated
            }
            None => {
                self.devices.insert(device.id.clone(), device);
                UpsertOutcome::Added
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<ReceiverDevice> {
        self.devices.remove(id).map(|(_, device)| device)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ReceiverDevice> {
        self.devices.get(id).map(|device| device.clone())
    }

    #[must_use]
    pub fn list(&self) -> Vec<ReceiverDevice> {
        let mut devices: Vec<_> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.friendly_name.cmp(&b.friendly_name));
        devices
    }

    /// Merges a status update into a known device and returns the merged
    /// status, or `None` when the device is not registered.
    pub fn apply_status(&self, id: &str, update: ReceiverStatus) -> Option<ReceiverStatus> {
        let mut device = self.devices.get_mut(id)?;
        let status = device.status.get_or_insert_with(ReceiverStatus::default);
        status.merge(update);
        Some(status.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::{Capabilities, Volume};

    fn device(id: &str, name: &str) -> ReceiverDevice {
        ReceiverDevice {
            id: id.into(),
            friendly_name: name.into(),
            model_name: Some("Chromecast".into()),
            host: "192.168.1.50".into(),
            port: 8009,
            capabilities: Capabilities::VIDEO_OUT | Capabilities::AUDIO_OUT,
            status: None,
        }
    }

    #[test]
    fn upsert_reports_added_updated_unchanged() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.upsert(device("a", "Kitchen")), UpsertOutcome::Added);
        assert_eq!(registry.upsert(device("a", "Kitchen")), UpsertOutcome::Unchanged);
        assert_eq!(registry.upsert(device("a", "Den")), UpsertOutcome::Updated);
        assert_eq!(registry.get("a").unwrap().friendly_name, "Den");
    }

    #[test]
    fn status_survives_metadata_refresh() {
        let registry = DeviceRegistry::new();
        registry.upsert(device("a", "Kitchen"));
        registry.apply_status(
            "a",
            ReceiverStatus {
                volume: Volume {
                    level: Some(0.7),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        registry.upsert(device("a", "Den"));
        let status = registry.get("a").unwrap().status.unwrap();
        assert_eq!(status.volume.level, Some(0.7));
    }

    #[test]
    fn apply_status_merges_rather_than_replaces() {
        let registry = DeviceRegistry::new();
        registry.upsert(device("a", "Kitchen"));
        registry.apply_status(
            "a",
            ReceiverStatus {
                volume: Volume {
                    level: Some(0.2),
                    muted: Some(false),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let merged = registry
            .apply_status(
                "a",
                ReceiverStatus {
                    volume: Volume {
                        muted: Some(true),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(merged.volume.level, Some(0.2));
        assert_eq!(merged.volume.muted, Some(true));
    }

    #[test]
    fn apply_status_for_unknown_device_is_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.apply_status("missing", ReceiverStatus::default()).is_none());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = DeviceRegistry::new();
        registry.upsert(device("b", "Office"));
        registry.upsert(device("a", "Bedroom"));
        let names: Vec<_> = registry.list().into_iter().map(|d| d.friendly_name).collect();
        assert_eq!(names, vec!["Bedroom", "Office"]);
    }
}
