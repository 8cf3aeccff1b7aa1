//! Status watching for discovered receivers.
//!
//! When the extension starts discovery with `shouldWatchStatus`, every
//! receiver the registry knows about (and every one that appears later) gets a
//! [`StatusMonitor`]. Monitors are keyed by device id so a device is never
//! watched twice.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cast::Connector;
use crate::events::EventEmitter;
use crate::monitor::{MonitorOptions, StatusMonitor};
use crate::receiver::{DeviceRegistry, ReceiverDevice};
use crate::state::Config;

/// Owns one [`StatusMonitor`] per watched device.
pub struct StatusWatcher {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
    registry: Arc<DeviceRegistry>,
    emitter: Arc<dyn EventEmitter>,
    monitors: DashMap<String, StatusMonitor>,
}

impl StatusWatcher {
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn Connector>,
        registry: Arc<DeviceRegistry>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            config,
            connector,
            registry,
            emitter,
            monitors: DashMap::new(),
        }
    }

    /// Starts watching `device`. Returns `false` if it was already watched.
    pub fn watch(&self, device: ReceiverDevice) -> bool {
        match self.monitors.entry(device.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                log::debug!("[StatusWatch] Watching {}", device.friendly_name);
                let monitor = StatusMonitor::new(
                    MonitorOptions::from_config(&self.config, device),
                    Arc::clone(&self.connector),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.emitter),
                );
                monitor.start();
                slot.insert(monitor);
                true
            }
        }
    }

    /// Watches every device currently in the registry.
    pub fn watch_all(&self) -> usize {
        self.registry
            .list()
            .into_iter()
            .filter(|device| self.watch(device.clone()))
            .count()
    }

    /// Stops watching one device. Returns `false` if it was not watched.
    pub fn unwatch(&self, device_id: &str) -> bool {
        match self.monitors.remove(device_id) {
            Some((_, monitor)) => {
                monitor.stop();
                true
            }
            None => false,
        }
    }

    /// Stops every monitor. Returns how many were running.
    pub fn stop_all(&self) -> usize {
        let ids: Vec<String> = self.monitors.iter().map(|m| m.key().clone()).collect();
        let stopped = ids.iter().filter(|id| self.unwatch(id)).count();
        if stopped > 0 {
            log::info!("[StatusWatch] Stopped {} monitor(s)", stopped);
        }
        stopped
    }

    #[must_use]
    pub fn is_watching(&self, device_id: &str) -> bool {
        self.monitors.contains_key(device_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        for monitor in self.monitors.iter() {
            monitor.value().stop();
        }
    }
}
