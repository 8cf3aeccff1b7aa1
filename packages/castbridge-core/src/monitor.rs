//! Passive receiver status monitoring.
//!
//! A [`StatusMonitor`] connects to a receiver under its own sender id, asks
//! for the current status and then relays every `RECEIVER_STATUS` push. When a
//! non-idle application is running it also joins that application's media
//! namespace and relays `MEDIA_STATUS`. It never launches or stops anything,
//! so it can run next to a [`CastSession`](crate::session::CastSession) on the
//! same device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cast::payload::{MediaRequest, MediaResponse, ReceiverRequest, ReceiverResponse};
use crate::cast::{
    is_close, AppConnection, CastTransport, Connector, TransportOptions, VirtualChannel,
};
use crate::events::{EventEmitter, StatusEvent};
use crate::protocol_constants::{MEDIA_NAMESPACE, PLATFORM_RECEIVER_ID, RECEIVER_NAMESPACE};
use crate::receiver::{DeviceRegistry, ReceiverDevice, ReceiverStatus};
use crate::state::Config;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub device: ReceiverDevice,
    pub source_id: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl MonitorOptions {
    pub fn from_config(config: &Config, device: ReceiverDevice) -> Self {
        Self {
            device,
            source_id: config.monitor_source_id.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// The application currently observed on the media namespace.
struct WatchedApp {
    transport_id: String,
    connection: AppConnection,
}

struct MonitorInner {
    options: MonitorOptions,
    transport: CastTransport,
    receiver_channel: VirtualChannel,
    registry: Arc<DeviceRegistry>,
    emitter: Arc<dyn EventEmitter>,
    last_status: Mutex<Option<ReceiverStatus>>,
    app: Arc<Mutex<Option<WatchedApp>>>,
    next_request_id: AtomicU32,
    cancel: CancellationToken,
}

/// Read-only observer of one receiver's status.
#[derive(Clone)]
pub struct StatusMonitor {
    inner: Arc<MonitorInner>,
}

/// Inbound traffic for the watched application.
struct AppListeners {
    transport_id: String,
    connection: mpsc::UnboundedReceiver<Value>,
    media: mpsc::UnboundedReceiver<Value>,
}

impl AppListeners {
    /// Discards traffic that arrived while the application was not followed.
    fn drain(&mut self) {
        while self.connection.try_recv().is_ok() {}
        while self.media.try_recv().is_ok() {}
    }
}

/// Listeners of the followed application plus those of applications left
/// earlier. Channels outlive a CLOSE and hand out one listener each, so a
/// rejoined transport id must get its old listeners back.
#[derive(Default)]
struct AppFollower {
    current: Option<AppListeners>,
    parked: HashMap<String, AppListeners>,
}

impl AppFollower {
    fn park(&mut self) {
        if let Some(listeners) = self.current.take() {
            self.parked.insert(listeners.transport_id.clone(), listeners);
        }
    }

    fn reclaim(&mut self, transport_id: &str) -> Option<AppListeners> {
        let mut listeners = self.parked.remove(transport_id)?;
        listeners.drain();
        Some(listeners)
    }
}

impl StatusMonitor {
    pub fn new(
        options: MonitorOptions,
        connector: Arc<dyn Connector>,
        registry: Arc<DeviceRegistry>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let transport = CastTransport::new(
            TransportOptions {
                source_id: options.source_id.clone(),
                destination_id: PLATFORM_RECEIVER_ID.to_string(),
                heartbeat_interval: options.heartbeat_interval,
                connect_timeout: options.connect_timeout,
            },
            connector,
        );
        let receiver_channel = transport.channel(RECEIVER_NAMESPACE);

        Self {
            inner: Arc::new(MonitorInner {
                options,
                transport,
                receiver_channel,
                registry,
                emitter,
                last_status: Mutex::new(None),
                app: Arc::new(Mutex::new(None)),
                next_request_id: AtomicU32::new(0),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.options.device.id
    }

    /// Last merged status seen by this monitor.
    pub fn last_status(&self) -> Option<ReceiverStatus> {
        self.inner.last_status.lock().clone()
    }

    /// Transport id of the application whose media status is being relayed.
    pub fn watched_transport_id(&self) -> Option<String> {
        self.inner.app.lock().as_ref().map(|app| app.transport_id.clone())
    }

    /// Spawns the monitor task.
    pub fn start(&self) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    /// Stops monitoring and disconnects. Idempotent.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    async fn run(self) {
        let inner = &self.inner;
        let device = &inner.options.device;
        let Some(mut receiver_rx) = inner.receiver_channel.listen() else {
            log::error!("[Monitor] Receiver listener already taken");
            return;
        };

        let connect = inner.transport.connect(&device.host, device.port);
        let connected = tokio::select! {
            _ = inner.cancel.cancelled() => false,
            result = connect => match result {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("[Monitor] Could not connect to {}: {}", device.friendly_name, e);
                    false
                }
            },
        };
        if !connected {
            self.teardown();
            return;
        }

        let app_slot = Arc::clone(&inner.app);
        inner.transport.set_heartbeat_hook(Arc::new(move || {
            if let Some(app) = app_slot.lock().as_ref() {
                app.connection.ping();
            }
        }));

        let request = ReceiverRequest::GetStatus {
            request_id: self.next_request_id(),
        };
        if let Err(e) = inner.receiver_channel.send(&request) {
            log::warn!("[Monitor] GET_STATUS not sent: {}", e);
        }
        log::info!("[Monitor] Watching {}", device.friendly_name);

        let mut follower = AppFollower::default();
        loop {
            tokio::select! {
                _ = inner.cancel.cancelled() => break,
                payload = receiver_rx.recv() => match payload {
                    Some(payload) => self.handle_receiver_payload(payload, &mut follower),
                    None => {
                        log::info!(
                            "[Monitor] Connection to {} ended: {:?}",
                            device.friendly_name,
                            inner.transport.disconnect_reason()
                        );
                        break;
                    }
                },
                payload = recv_app(&mut follower.current) => match payload {
                    Some(AppTraffic::Media(payload)) => self.handle_media_payload(payload),
                    Some(AppTraffic::Connection(payload)) if is_close(&payload) => {
                        log::debug!("[Monitor] Application closed its connection");
                        self.close_app();
                        follower.park();
                    }
                    Some(AppTraffic::Connection(_)) => {}
                    None => follower.current = None,
                },
            }
        }

        self.teardown();
    }

    fn next_request_id(&self) -> u32 {
        self.inner.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Relays a receiver status and switches the followed application when
    /// the active one changed.
    fn handle_receiver_payload(&self, payload: Value, follower: &mut AppFollower) {
        let ReceiverResponse::ReceiverStatus { status, .. } = ReceiverResponse::parse(payload) else {
            return;
        };
        let inner = &self.inner;
        let device_id = &inner.options.device.id;

        inner.registry.apply_status(device_id, status.clone());
        let merged = {
            let mut last = inner.last_status.lock();
            let merged = last.get_or_insert_with(ReceiverStatus::default);
            merged.merge(status);
            merged.clone()
        };

        let active = merged
            .active_application()
            .map(|app| app.transport_id.clone());
        inner.emitter.emit_status(StatusEvent::ReceiverStatusUpdated {
            device_id: device_id.clone(),
            status: merged,
        });

        let watched = self.watched_transport_id();
        if active == watched {
            return;
        }
        self.close_app();
        follower.park();
        if let Some(transport_id) = active {
            let listeners = self.open_app(&transport_id, follower);
            follower.current = listeners;
        }
    }

    fn handle_media_payload(&self, payload: Value) {
        match serde_json::from_value::<MediaResponse>(payload) {
            Ok(MediaResponse::MediaStatus { status, .. }) => {
                self.inner.emitter.emit_status(StatusEvent::MediaStatusUpdated {
                    device_id: self.inner.options.device.id.clone(),
                    status,
                });
            }
            Ok(MediaResponse::Other) => {}
            Err(e) => log::debug!("[Monitor] Ignoring unparseable media payload: {}", e),
        }
    }

    fn open_app(&self, transport_id: &str, follower: &mut AppFollower) -> Option<AppListeners> {
        let inner = &self.inner;
        let connection =
            match AppConnection::open(&inner.transport, &inner.options.source_id, transport_id) {
                Ok(connection) => connection,
                Err(e) => {
                    log::warn!("[Monitor] Could not join {}: {}", transport_id, e);
                    return None;
                }
            };
        let media = inner.transport.create_channel(
            MEDIA_NAMESPACE,
            Some(&inner.options.source_id),
            Some(transport_id),
        );
        let listeners = follower.reclaim(transport_id).or_else(|| {
            match (connection.listen(), media.listen()) {
                (Some(connection), Some(media)) => Some(AppListeners {
                    transport_id: transport_id.to_string(),
                    connection,
                    media,
                }),
                _ => {
                    log::warn!("[Monitor] Listeners for {} unavailable", transport_id);
                    None
                }
            }
        });

        let request = MediaRequest::GetStatus {
            request_id: self.next_request_id(),
        };
        if let Err(e) = media.send(&request) {
            log::debug!("[Monitor] Media GET_STATUS not sent: {}", e);
        }
        log::debug!("[Monitor] Following media on {}", transport_id);

        *inner.app.lock() = Some(WatchedApp {
            transport_id: transport_id.to_string(),
            connection,
        });
        listeners
    }

    fn close_app(&self) {
        if let Some(app) = self.inner.app.lock().take() {
            app.connection.close();
            log::debug!("[Monitor] Stopped following {}", app.transport_id);
        }
    }

    fn teardown(&self) {
        self.inner.cancel.cancel();
        self.close_app();
        self.inner.transport.disconnect();
        log::debug!("[Monitor] Stopped watching {}", self.inner.options.device.friendly_name);
    }
}

enum AppTraffic {
    Media(Value),
    Connection(Value),
}

/// Waits for traffic from the watched application. `None` means a listener
/// ended.
async fn recv_app(listeners: &mut Option<AppListeners>) -> Option<AppTraffic> {
    let Some(listeners) = listeners else {
        return std::future::pending().await;
    };
    tokio::select! {
        payload = listeners.media.recv() => payload.map(AppTraffic::Media),
        payload = listeners.connection.recv() => payload.map(AppTraffic::Connection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::transport::testing::{DuplexConnector, FakeReceiver};
    use crate::events::DiscoveryEvent;
    use crate::protocol_constants::CONNECTION_NAMESPACE;
    use crate::receiver::Capabilities;
    use serde_json::json;

    struct ChannelEmitter(mpsc::UnboundedSender<StatusEvent>);

    impl EventEmitter for ChannelEmitter {
        fn emit_discovery(&self, _event: DiscoveryEvent) {}

        fn emit_status(&self, event: StatusEvent) {
            let _ = self.0.send(event);
        }
    }

    fn device() -> ReceiverDevice {
        ReceiverDevice {
            id: "dev-1".into(),
            friendly_name: "Kitchen".into(),
            model_name: Some("Chromecast".into()),
            host: "10.0.0.5".into(),
            port: 8009,
            capabilities: Capabilities::AUDIO_OUT,
            status: None,
        }
    }

    async fn started() -> (
        StatusMonitor,
        Arc<DeviceRegistry>,
        mpsc::UnboundedReceiver<StatusEvent>,
        FakeReceiver,
    ) {
        let (connector, mut peers) = DuplexConnector::new();
        let registry = Arc::new(DeviceRegistry::new());
        registry.upsert(device());
        let (tx, events) = mpsc::unbounded_channel();
        let monitor = StatusMonitor::new(
            MonitorOptions::from_config(&Config::default(), device()),
            connector,
            Arc::clone(&registry),
            Arc::new(ChannelEmitter(tx)),
        );
        monitor.start();
        let mut receiver = FakeReceiver::new(peers.recv().await.unwrap());

        let (message, payload) = receiver.expect(RECEIVER_NAMESPACE).await;
        assert_eq!(message.source_id, "sender-monitor");
        assert_eq!(payload, json!({"type": "GET_STATUS", "requestId": 0}));
        (monitor, registry, events, receiver)
    }

    #[tokio::test]
    async fn status_updates_merge_volume_and_replace_applications() {
        let (monitor, registry, mut events, mut receiver) = started().await;

        receiver
            .send(
                "receiver-0",
                "*",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "requestId": 0, "status": {
                    "applications": [{"appId": "E8C28D3C", "sessionId": "idle", "transportId": "idle-t", "isIdleScreen": true}],
                    "volume": {"level": 0.3, "muted": true}
                }}),
            )
            .await;
        events.recv().await.unwrap();

        receiver
            .send(
                "receiver-0",
                "*",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "status": {"volume": {"level": 0.8}}}),
            )
            .await;
        match events.recv().await.unwrap() {
            StatusEvent::ReceiverStatusUpdated { device_id, status } => {
                assert_eq!(device_id, "dev-1");
                assert_eq!(status.volume.level, Some(0.8));
                assert_eq!(status.volume.muted, Some(true));
                assert!(status.applications().is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }

        let stored = registry.get("dev-1").unwrap().status.unwrap();
        assert_eq!(stored.volume.muted, Some(true));
        assert_eq!(monitor.last_status().unwrap().volume.level, Some(0.8));
        assert!(monitor.watched_transport_id().is_none());
    }

    #[tokio::test]
    async fn running_app_is_followed_on_media_namespace() {
        let (monitor, _registry, mut events, mut receiver) = started().await;

        receiver
            .send(
                "receiver-0",
                "*",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "status": {
                    "applications": [{"appId": "CC1AD845", "sessionId": "S9", "transportId": "T9", "isIdleScreen": false}]
                }}),
            )
            .await;
        events.recv().await.unwrap();

        let (connect, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
        assert_eq!(connect.destination_id, "T9");
        assert_eq!(payload["type"], "CONNECT");
        let (_, media_request) = receiver.expect(MEDIA_NAMESPACE).await;
        assert_eq!(media_request["type"], "GET_STATUS");

        receiver
            .send(
                "T9",
                "*",
                MEDIA_NAMESPACE,
                json!({"type": "MEDIA_STATUS", "status": [{"mediaSessionId": 1, "playerState": "PLAYING"}]}),
            )
            .await;
        match events.recv().await.unwrap() {
            StatusEvent::MediaStatusUpdated { device_id, status } => {
                assert_eq!(device_id, "dev-1");
                assert_eq!(status[0]["playerState"], "PLAYING");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(monitor.watched_transport_id().as_deref(), Some("T9"));

        // Application gone: the monitor leaves it.
        receiver
            .send(
                "receiver-0",
                "*",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "status": {"applications": []}}),
            )
            .await;
        events.recv().await.unwrap();
        loop {
            let (message, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
            if message.destination_id == "T9" && is_close(&payload) {
                break;
            }
        }
        assert!(monitor.watched_transport_id().is_none());
    }

    async fn send_running_app(receiver: &mut FakeReceiver, transport_id: &str) {
        receiver
            .send(
                "receiver-0",
                "*",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "status": {
                    "applications": [{"appId": "CC1AD845", "sessionId": "S9", "transportId": transport_id, "isIdleScreen": false}]
                }}),
            )
            .await;
    }

    #[tokio::test]
    async fn media_is_relayed_again_after_app_closes_and_is_rejoined() {
        let (monitor, _registry, mut events, mut receiver) = started().await;

        send_running_app(&mut receiver, "T9").await;
        events.recv().await.unwrap();
        receiver.expect(MEDIA_NAMESPACE).await;

        // The application drops our connection but stays listed as running.
        receiver
            .send("T9", "sender-monitor", CONNECTION_NAMESPACE, json!({"type": "CLOSE"}))
            .await;
        loop {
            let (message, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
            if message.destination_id == "T9" && is_close(&payload) {
                break;
            }
        }

        send_running_app(&mut receiver, "T9").await;
        events.recv().await.unwrap();
        let (connect, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
        assert_eq!(connect.destination_id, "T9");
        assert_eq!(payload["type"], "CONNECT");
        let (_, media_request) = receiver.expect(MEDIA_NAMESPACE).await;
        assert_eq!(media_request["type"], "GET_STATUS");
        assert_eq!(monitor.watched_transport_id().as_deref(), Some("T9"));

        receiver
            .send(
                "T9",
                "*",
                MEDIA_NAMESPACE,
                json!({"type": "MEDIA_STATUS", "status": [{"mediaSessionId": 2, "playerState": "PAUSED"}]}),
            )
            .await;
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            StatusEvent::MediaStatusUpdated { status, .. } => {
                assert_eq!(status[0]["playerState"], "PAUSED");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_disconnects() {
        let (monitor, _registry, _events, mut receiver) = started().await;
        monitor.stop();

        let mut saw_close = false;
        while let Some(message) = receiver.next_non_heartbeat().await {
            if message.namespace == CONNECTION_NAMESPACE {
                let payload: Value = serde_json::from_str(message.text_payload().unwrap()).unwrap();
                saw_close |= is_close(&payload);
            }
        }
        assert!(saw_close);
        assert!(monitor.is_stopped());
    }
}
