//! Cast receivers: device model, registry and mDNS discovery.

mod discovery;
mod registry;
mod types;

pub use discovery::{device_from_record, Discovery, DiscoveryError, DiscoveryResult, TxtRecords};
pub use registry::{DeviceRegistry, UpsertOutcome};
pub use types::{
    Capabilities, NamespaceEntry, ReceiverApplication, ReceiverDevice, ReceiverStatus, Volume,
};
