//! mDNS discovery of Cast receivers.
//!
//! Browses `_googlecast._tcp.local.` continuously while started, keeping the
//! [`DeviceRegistry`] in sync and emitting [`DiscoveryEvent`]s for every
//! membership change.
//!
//! # Key Design Points
//!
//! - Uses resolved record data (IP from SRV/A answers) for the host
//! - The TXT `id` record is the device id; instance names are the fallback
//! - Removals arrive keyed by service fullname, so the browse loop keeps a
//!   fullname → device id map to translate them

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::registry::{DeviceRegistry, UpsertOutcome};
use super::types::{Capabilities, ReceiverDevice};
use crate::events::{DiscoveryEvent, EventEmitter};
use crate::protocol_constants::DEFAULT_CAST_PORT;

/// Errors that can occur while starting discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// mDNS daemon could not be created.
    #[error("mDNS daemon error: {0}")]
    MdnsDaemon(String),

    /// Browsing for the service type failed.
    #[error("mDNS browse failed: {0}")]
    Browse(String),

    /// Discovery is disabled by configuration.
    #[error("discovery is disabled")]
    Disabled,
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// TXT records keyed by record name.
pub type TxtRecords = HashMap<String, String>;

struct ActiveBrowse {
    daemon: ServiceDaemon,
    cancel: CancellationToken,
}

/// Continuous mDNS browser feeding the device registry.
pub struct Discovery {
    service_type: String,
    enabled: bool,
    registry: Arc<DeviceRegistry>,
    emitter: Arc<dyn EventEmitter>,
    active: Mutex<Option<ActiveBrowse>>,
}

impl Discovery {
    pub fn new(
        service_type: impl Into<String>,
        enabled: bool,
        registry: Arc<DeviceRegistry>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            service_type: service_type.into(),
            enabled,
            registry,
            emitter,
            active: Mutex::new(None),
        }
    }

    /// Starts browsing. Returns `Ok(false)` when discovery was already running.
    pub fn start(&self) -> DiscoveryResult<bool> {
        if !self.enabled {
            return Err(DiscoveryError::Disabled);
        }

        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(false);
        }

        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;
        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;
        let cancel = CancellationToken::new();

        let registry = Arc::clone(&self.registry);
        let emitter = Arc::clone(&self.emitter);
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut names: HashMap<String, String> = HashMap::new();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv_async() => match event {
                        Ok(event) => handle_event(event, &mut names, &registry, emitter.as_ref()),
                        Err(e) => {
                            log::debug!("[mDNS] Receiver channel closed: {:?}", e);
                            break;
                        }
                    }
                }
            }
            log::debug!("[mDNS] Browse loop ended");
        });

        log::info!("[mDNS] Browsing for {}", self.service_type);
        *active = Some(ActiveBrowse { daemon, cancel });
        Ok(true)
    }

    /// Stops browsing. Known devices stay in the registry.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(e) = active.daemon.stop_browse(&self.service_type) {
            log::warn!("[mDNS] Failed to stop browse: {:?}", e);
        }
        if let Err(e) = active.daemon.shutdown() {
            log::debug!("[mDNS] Daemon shutdown failed: {:?}", e);
        }
        log::info!("[mDNS] Discovery stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_event(
    event: ServiceEvent,
    names: &mut HashMap<String, String>,
    registry: &DeviceRegistry,
    emitter: &dyn EventEmitter,
) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            log::trace!("[mDNS] Service resolved: {:?}", info.fullname);
            let txt: TxtRecords = info
                .txt_properties
                .iter()
                .map(|p| (p.key().to_string(), p.val_str().to_string()))
                .collect();
            let addresses: Vec<IpAddr> = info.addresses.iter().map(|a| a.to_ip_addr()).collect();

            let Some(device) =
                device_from_record(&info.fullname, &info.host, info.port, &addresses, &txt)
            else {
                log::debug!("[mDNS] Skipping unusable record {}", info.fullname);
                return;
            };

            names.insert(info.fullname.clone(), device.id.clone());
            let id = device.id.clone();
            match registry.upsert(device) {
                UpsertOutcome::Added | UpsertOutcome::Updated => {
                    if let Some(device) = registry.get(&id) {
                        log::info!(
                            "[mDNS] Device up: {} ({}:{})",
                            device.friendly_name,
                            device.host,
                            device.port
                        );
                        emitter.emit_discovery(DiscoveryEvent::DeviceUp { device });
                    }
                }
                UpsertOutcome::Unchanged => {}
            }
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            if let Some(id) = names.remove(&fullname) {
                registry.remove(&id);
                log::info!("[mDNS] Device down: {}", id);
                emitter.emit_discovery(DiscoveryEvent::DeviceDown { device_id: id });
            }
        }
        other => log::trace!("[mDNS] Ignoring event: {:?}", other),
    }
}

/// Instance label of a service fullname, e.g. `Chromecast-abc` from
/// `Chromecast-abc._googlecast._tcp.local.`.
fn instance_name(fullname: &str) -> &str {
    fullname.split("._").next().unwrap_or(fullname)
}

/// Builds a device from a resolved service record.
///
/// Returns `None` when no usable host can be determined.
pub fn device_from_record(
    fullname: &str,
    hostname: &str,
    port: u16,
    addresses: &[IpAddr],
    txt: &TxtRecords,
) -> Option<ReceiverDevice> {
    let non_empty = |key: &str| txt.get(key).map(String::as_str).filter(|v| !v.is_empty());

    let host = addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .map(ToString::to_string)
        .or_else(|| {
            let name = hostname.trim_end_matches('.');
            (!name.is_empty()).then(|| name.to_string())
        })?;

    let id = non_empty("id")
        .map(str::to_string)
        .unwrap_or_else(|| instance_name(fullname).to_string());
    let friendly_name = non_empty("fn")
        .map(str::to_string)
        .unwrap_or_else(|| instance_name(fullname).to_string());
    let capabilities = non_empty("ca")
        .and_then(|ca| ca.parse::<u32>().ok())
        .map(Capabilities::from_bits_truncate)
        .unwrap_or_default();

    Some(ReceiverDevice {
        id,
        friendly_name,
        model_name: non_empty("md").map(str::to_string),
        host,
        port: if port == 0 { DEFAULT_CAST_PORT } else { port },
        capabilities,
        status: None,
    })
}
