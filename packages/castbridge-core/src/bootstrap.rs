//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root: the single place where the
//! shared services are instantiated and wired together. Routers (one per
//! extension connection) are created from it on demand.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cast::{Connector, TlsConnector};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::receiver::{DeviceRegistry, Discovery};
use crate::router::{BridgeRouter, RouterContext};
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Validated configuration.
    pub config: Arc<Config>,
    /// Every receiver currently known, shared by all connections.
    pub registry: Arc<DeviceRegistry>,
    /// mDNS browser feeding the registry.
    pub discovery: Arc<Discovery>,
    /// Discovery and status events fanned out to every router.
    pub event_bridge: BroadcastEventBridge,
    /// Opens sockets to receivers.
    pub connector: Arc<dyn Connector>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Shared context handed to each router.
    pub fn context(&self) -> RouterContext {
        RouterContext {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            discovery: Arc::clone(&self.discovery),
            events: self.event_bridge.clone(),
            connector: Arc::clone(&self.connector),
        }
    }

    /// Creates a router for one extension connection.
    pub fn router(&self, outgoing: mpsc::UnboundedSender<Value>) -> BridgeRouter {
        BridgeRouter::new(self.context(), outgoing)
    }

    /// Initiates graceful shutdown: signals every channel loop and stops
    /// discovery. Routers close their own instances as their loops end.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
        self.discovery.stop();
        log::info!(
            "[Bootstrap] Shutdown complete ({} device(s) known)",
            self.registry.len()
        );
    }
}

/// Bootstraps the bridge with the TLS connector used for real receivers.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or TLS cannot be set up.
pub fn bootstrap_services(config: &Config) -> BridgeResult<BootstrappedServices> {
    let connector = Arc::new(TlsConnector::new()?);
    bootstrap_services_with_connector(config, connector)
}

/// Bootstraps the bridge around an arbitrary connector.
///
/// Wiring order:
///
/// 1. Event bridge (with a logging emitter attached)
/// 2. Device registry
/// 3. Discovery (depends on registry and event bridge)
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn bootstrap_services_with_connector(
    config: &Config,
    connector: Arc<dyn Connector>,
) -> BridgeResult<BootstrappedServices> {
    config.validate().map_err(BridgeError::Configuration)?;
    let config = Arc::new(config.clone());

    let event_bridge = BroadcastEventBridge::new(config.event_channel_capacity);
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let registry = Arc::new(DeviceRegistry::new());
    let discovery = Arc::new(Discovery::new(
        config.discovery.service_type.clone(),
        config.discovery.enabled,
        Arc::clone(&registry),
        Arc::new(event_bridge.clone()) as Arc<dyn EventEmitter>,
    ));

    log::info!(
        "[Bootstrap] Services ready (discovery {})",
        if config.discovery.enabled { "enabled" } else { "disabled" }
    );

    Ok(BootstrappedServices {
        config,
        registry,
        discovery,
        event_bridge,
        connector,
        cancel_token: CancellationToken::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::transport::testing::HangingConnector;
    use crate::protocol_constants::BRIDGE_VERSION;
    use serde_json::json;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.discovery.enabled = false;
        config
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config {
            event_channel_capacity: 0,
            ..offline_config()
        };
        let err = bootstrap_services_with_connector(&config, Arc::new(HangingConnector))
            .err()
            .unwrap();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn routers_share_services() {
        let services =
            bootstrap_services_with_connector(&offline_config(), Arc::new(HangingConnector))
                .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = services.router(tx);
        router.handle_value(json!({"subject": "bridge:getInfo"}));
        assert_eq!(rx.recv().await.unwrap(), json!(BRIDGE_VERSION));

        assert!(Arc::ptr_eq(&services.context().registry, &services.registry));

        services.shutdown();
        assert!(services.cancel_token.is_cancelled());
        assert!(!services.discovery.is_running());
    }
}
