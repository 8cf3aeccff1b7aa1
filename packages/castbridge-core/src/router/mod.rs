//! Bridge message router.
//!
//! One [`BridgeRouter`] serves one extension connection. It owns the
//! connection's instances (sessions and status monitors) keyed by an opaque
//! instance id, dispatches inbound messages on their subject and relays every
//! instance event back tagged with that id. It performs no protocol logic of
//! its own.
//!
//! Messages that cannot be routed (unknown subject, unknown session or
//! instance, malformed data) are logged and dropped.

mod message;
mod outbound;

pub use message::{
    subjects, BridgeMessage, CreateCastSessionRequest, RemoteInitializeRequest,
    SendCastReceiverMessageRequest, SendCastSessionMessageRequest, SetCastReceiverVolumeRequest,
    StartDiscoveryRequest, StopCastSessionRequest,
};
pub use outbound::{ConnectionEmitter, Outbound};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cast::Connector;
use crate::events::{BroadcastEvent, BroadcastEventBridge, DiscoveryEvent};
use crate::monitor::{MonitorOptions, StatusMonitor};
use crate::protocol_constants::BRIDGE_VERSION;
use crate::receiver::{DeviceRegistry, Discovery, DiscoveryError};
use crate::services::StatusWatcher;
use crate::session::{
    CastSession, PendingSend, SessionError, SessionEvent, SessionOptions, SessionResult,
};
use crate::state::Config;

/// Shared services every router draws on.
#[derive(Clone)]
pub struct RouterContext {
    pub config: Arc<Config>,
    pub registry: Arc<DeviceRegistry>,
    pub discovery: Arc<Discovery>,
    pub events: BroadcastEventBridge,
    pub connector: Arc<dyn Connector>,
}

#[cfg(test)]
impl RouterContext {
    /// Context with mDNS disabled and an empty registry.
    pub(crate) fn for_tests(connector: Arc<dyn Connector>) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let events = BroadcastEventBridge::new(16);
        let discovery = Arc::new(Discovery::new(
            "_googlecast._tcp.local.",
            false,
            Arc::clone(&registry),
            Arc::new(events.clone()),
        ));
        Self {
            config: Arc::new(Config::default()),
            registry,
            discovery,
            events,
            connector,
        }
    }
}

/// Something living under an instance id.
#[derive(Clone)]
enum Instance {
    Session(CastSession),
    Monitor(StatusMonitor),
}

impl Instance {
    fn stop(&self) {
        match self {
            Self::Session(session) => session.stop(),
            Self::Monitor(monitor) => monitor.stop(),
        }
    }
}

type Instances = Arc<DashMap<String, Instance>>;

struct RouterInner {
    ctx: RouterContext,
    outbound: Outbound,
    instances: Instances,
    watcher: Arc<StatusWatcher>,
    watch_status: Arc<AtomicBool>,
    forwarding: Mutex<Option<CancellationToken>>,
}

/// Routes messages for one extension connection.
#[derive(Clone)]
pub struct BridgeRouter {
    inner: Arc<RouterInner>,
}

impl BridgeRouter {
    /// Creates a router whose output goes to `outgoing`.
    pub fn new(ctx: RouterContext, outgoing: mpsc::UnboundedSender<Value>) -> Self {
        let outbound = Outbound::new(outgoing);
        let watcher = Arc::new(StatusWatcher::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.connector),
            Arc::clone(&ctx.registry),
            Arc::new(ConnectionEmitter::new(outbound.clone(), None)),
        ));

        Self {
            inner: Arc::new(RouterInner {
                ctx,
                outbound,
                instances: Arc::new(DashMap::new()),
                watcher,
                watch_status: Arc::new(AtomicBool::new(false)),
                forwarding: Mutex::new(None),
            }),
        }
    }

    /// Number of live sessions and monitors.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    /// Dispatches one decoded frame.
    pub fn handle_value(&self, value: Value) {
        match serde_json::from_value::<BridgeMessage>(value) {
            Ok(message) => self.handle(message),
            Err(e) => log::warn!("[Router] Dropping message without a valid envelope: {}", e),
        }
    }

    /// Dispatches one message on its subject.
    pub fn handle(&self, message: BridgeMessage) {
        log::debug!("[Router] <- {}", message.subject);
        match message.subject.as_str() {
            subjects::GET_INFO => self.inner.outbound.raw(Value::String(BRIDGE_VERSION.into())),
            subjects::START_DISCOVERY => {
                if let Some(request) = parse::<StartDiscoveryRequest>(&message) {
                    self.start_discovery(request);
                }
            }
            subjects::STOP_DISCOVERY => self.stop_discovery(),
            subjects::CREATE_CAST_SESSION => {
                if let Some(request) = parse::<CreateCastSessionRequest>(&message) {
                    self.create_session(request, message.id);
                }
            }
            subjects::SEND_CAST_SESSION_MESSAGE => {
                if let Some(request) = parse::<SendCastSessionMessageRequest>(&message) {
                    self.send_session_message(request);
                }
            }
            subjects::SEND_CAST_RECEIVER_MESSAGE => {
                if let Some(request) = parse::<SendCastReceiverMessageRequest>(&message) {
                    self.send_receiver_message(request);
                }
            }
            subjects::SET_CAST_RECEIVER_VOLUME => {
                if let Some(request) = parse::<SetCastReceiverVolumeRequest>(&message) {
                    self.set_volume(request);
                }
            }
            subjects::STOP_CAST_SESSION => {
                if let Some(request) = parse::<StopCastSessionRequest>(&message) {
                    self.stop_session(&request.session_id);
                }
            }
            subjects::REMOTE_CLOSE => self.close_instance(message.id.as_deref()),
            subject if subjects::is_initialize(subject) => self.initialize_remote(message),
            other => log::warn!("[Router] Unroutable subject {:?}; dropped", other),
        }
    }

    /// Stops every instance this connection created. Shared discovery keeps
    /// running for other connections.
    pub fn close(&self) {
        self.stop_forwarding();
        self.inner.watch_status.store(false, Ordering::Release);
        self.inner.watcher.stop_all();

        let instances: Vec<Instance> = self
            .inner
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for instance in &instances {
            instance.stop();
        }
        self.inner.instances.clear();
        if !instances.is_empty() {
            log::info!("[Router] Closed {} instance(s)", instances.len());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    fn start_discovery(&self, request: StartDiscoveryRequest) {
        match self.inner.ctx.discovery.start() {
            Ok(true) => {}
            Ok(false) => log::debug!("[Router] Discovery already running"),
            Err(DiscoveryError::Disabled) => {
                log::info!("[Router] mDNS disabled; reporting known devices only")
            }
            Err(e) => log::warn!("[Router] Discovery failed to start: {}", e),
        }

        self.inner
            .watch_status
            .store(request.should_watch_status, Ordering::Release);
        self.start_forwarding();
        if request.should_watch_status {
            self.inner.watcher.watch_all();
        }
    }

    fn stop_discovery(&self) {
        self.stop_forwarding();
        self.inner.watch_status.store(false, Ordering::Release);
        self.inner.watcher.stop_all();
        self.inner.ctx.discovery.stop();
    }

    /// Replays known devices, then relays discovery events until stopped.
    fn start_forwarding(&self) {
        let mut forwarding = self.inner.forwarding.lock();
        if forwarding.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let mut events = self.inner.ctx.events.subscribe();

        for device in self.inner.ctx.registry.list() {
            self.inner
                .outbound
                .broadcast(BroadcastEvent::Discovery(DiscoveryEvent::DeviceUp { device }), None);
        }

        let outbound = self.inner.outbound.clone();
        let watcher = Arc::clone(&self.inner.watcher);
        let watch_status = Arc::clone(&self.inner.watch_status);
        let cancel = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => {
                            if watch_status.load(Ordering::Acquire) {
                                follow_status(&watcher, &event);
                            }
                            outbound.broadcast(event, None);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("[Router] Discovery relay lagged; {} event(s) skipped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            log::debug!("[Router] Discovery relay stopped");
        });
        *forwarding = Some(token);
    }

    fn stop_forwarding(&self) {
        if let Some(token) = self.inner.forwarding.lock().take() {
            token.cancel();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    fn create_session(&self, request: CreateCastSessionRequest, id: Option<String>) {
        let instance_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.inner.instances.contains_key(&instance_id) {
            log::warn!("[Router] Instance {} already exists; createCastSession dropped", instance_id);
            return;
        }

        log::info!(
            "[Router] Creating session for {} on {}",
            request.app_id,
            request.receiver_device.friendly_name
        );
        let options = SessionOptions::from_config(
            &self.inner.ctx.config,
            request.app_id,
            request.receiver_device,
        );
        let (session, events) = CastSession::new(options, Arc::clone(&self.inner.ctx.connector));
        self.inner
            .instances
            .insert(instance_id.clone(), Instance::Session(session.clone()));
        session.start();

        tokio::spawn(relay_session_events(
            instance_id,
            session,
            events,
            self.inner.outbound.clone(),
            Arc::clone(&self.inner.instances),
        ));
    }

    /// Finds the session with `session_id` and the id it is registered under.
    fn find_session(&self, session_id: &str) -> Option<(String, CastSession)> {
        self.inner.instances.iter().find_map(|entry| match entry.value() {
            Instance::Session(session) if session.session_id().as_deref() == Some(session_id) => {
                Some((entry.key().clone(), session.clone()))
            }
            _ => None,
        })
    }

    fn routed_session(&self, session_id: &str, subject: &str) -> Option<(String, CastSession)> {
        let found = self.find_session(session_id);
        if found.is_none() {
            log::warn!("[Router] {} for unknown session {}; dropped", subject, session_id);
        }
        found
    }

    fn send_session_message(&self, request: SendCastSessionMessageRequest) {
        let Some((instance_id, session)) =
            self.routed_session(&request.session_id, subjects::SEND_CAST_SESSION_MESSAGE)
        else {
            return;
        };
        let queued =
            session.send_message(&request.namespace, request.message_text(), &request.message_id);
        self.reply_when_written(instance_id, request.session_id, request.message_id, queued);
    }

    fn send_receiver_message(&self, request: SendCastReceiverMessageRequest) {
        let Some((instance_id, session)) =
            self.routed_session(&request.session_id, subjects::SEND_CAST_RECEIVER_MESSAGE)
        else {
            return;
        };
        let queued = match request.message() {
            Ok(message) => session.send_receiver_message(message, &request.message_id),
            Err(e) => {
                log::warn!("[Router] Receiver message {} is not JSON: {}", request.message_id, e);
                Err(SessionError::InvalidMessage(e.to_string()))
            }
        };
        self.reply_when_written(instance_id, request.session_id, request.message_id, queued);
    }

    fn set_volume(&self, request: SetCastReceiverVolumeRequest) {
        let Some((instance_id, session)) =
            self.routed_session(&request.session_id, subjects::SET_CAST_RECEIVER_VOLUME)
        else {
            return;
        };
        let message_id = request
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let queued = session.set_volume(request.volume(), &message_id);
        self.reply_when_written(instance_id, request.session_id, message_id, queued);
    }

    /// Replies with `cast:impl_sendMessage` once a queued send has been
    /// written. The frame itself is already queued, so only the wait runs
    /// in the background.
    fn reply_when_written(
        &self,
        instance_id: String,
        session_id: String,
        message_id: String,
        queued: SessionResult<PendingSend>,
    ) {
        let outbound = self.inner.outbound.clone();
        match queued {
            Ok(pending) => {
                tokio::spawn(async move {
                    let result = pending.written().await;
                    reply_send_result(&outbound, &instance_id, &session_id, &message_id, result);
                });
            }
            Err(e) => reply_send_result(&outbound, &instance_id, &session_id, &message_id, Err(e)),
        }
    }

    fn stop_session(&self, session_id: &str) {
        if let Some((_, session)) = self.routed_session(session_id, subjects::STOP_CAST_SESSION) {
            session.stop();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote (status monitor) instances
    // ─────────────────────────────────────────────────────────────────────────

    fn initialize_remote(&self, message: BridgeMessage) {
        let Some(instance_id) = message.id.clone() else {
            log::warn!("[Router] {} without _id; dropped", message.subject);
            return;
        };
        let Some(request) = parse::<RemoteInitializeRequest>(&message) else {
            return;
        };
        if self.inner.instances.contains_key(&instance_id) {
            log::warn!("[Router] Instance {} already exists; {} dropped", instance_id, message.subject);
            return;
        }

        let ctx = &self.inner.ctx;
        let monitor = StatusMonitor::new(
            MonitorOptions::from_config(&ctx.config, request.receiver_device),
            Arc::clone(&ctx.connector),
            Arc::clone(&ctx.registry),
            Arc::new(ConnectionEmitter::new(
                self.inner.outbound.clone(),
                Some(instance_id.clone()),
            )),
        );
        monitor.start();
        log::info!("[Router] Remote {} watching {}", instance_id, monitor.device_id());
        self.inner
            .instances
            .insert(instance_id, Instance::Monitor(monitor));
    }

    fn close_instance(&self, instance_id: Option<&str>) {
        let Some(instance_id) = instance_id else {
            log::warn!("[Router] {} without _id; dropped", subjects::REMOTE_CLOSE);
            return;
        };
        match self.inner.instances.remove(instance_id) {
            Some((_, instance)) => {
                instance.stop();
                log::info!("[Router] Instance {} closed", instance_id);
            }
            None => log::warn!("[Router] Close for unknown instance {}; dropped", instance_id),
        }
    }
}

fn parse<T: DeserializeOwned>(message: &BridgeMessage) -> Option<T> {
    match message.parse_data() {
        Ok(request) => Some(request),
        Err(e) => {
            log::warn!("[Router] Malformed {} data: {}", message.subject, e);
            None
        }
    }
}

fn follow_status(watcher: &StatusWatcher, event: &BroadcastEvent) {
    match event {
        BroadcastEvent::Discovery(DiscoveryEvent::DeviceUp { device }) => {
            watcher.watch(device.clone());
        }
        BroadcastEvent::Discovery(DiscoveryEvent::DeviceDown { device_id }) => {
            watcher.unwatch(device_id);
        }
        BroadcastEvent::Status(_) => {}
    }
}

/// Replies to a send with `cast:impl_sendMessage`.
fn reply_send_result(
    outbound: &Outbound,
    instance_id: &str,
    session_id: &str,
    message_id: &str,
    result: SessionResult<()>,
) {
    let mut data = json!({ "sessionId": session_id, "messageId": message_id });
    if let Err(e) = result {
        log::debug!("[Router] Send {} failed: {}", message_id, e);
        data["error"] = Value::Bool(true);
    }
    outbound.send(subjects::SEND_MESSAGE_RESULT, &data, Some(instance_id));
}

/// Relays one session's events until its final event, then unregisters it.
async fn relay_session_events(
    instance_id: String,
    session: CastSession,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    outbound: Outbound,
    instances: Instances,
) {
    let id = Some(instance_id.as_str());
    while let Some(event) = events.recv().await {
        let is_final = event.is_final();
        match event {
            SessionEvent::Created(info) => outbound.send(subjects::CAST_SESSION_CREATED, &info, id),
            SessionEvent::Updated(update) => outbound.send(subjects::SESSION_UPDATED, &update, id),
            SessionEvent::Stopped { session_id } => outbound.send(
                subjects::SESSION_STOPPED,
                &json!({ "sessionId": session_id }),
                id,
            ),
            SessionEvent::LaunchFailed { app_id, reason } => outbound.send(
                subjects::CAST_SESSION_CREATE_FAILED,
                &json!({
                    "appId": app_id,
                    "error": format!("Failed to launch {} on {}", app_id, session.receiver().friendly_name),
                    "reason": reason,
                }),
                id,
            ),
            SessionEvent::MessageReceived {
                session_id,
                namespace,
                message_data,
            } => outbound.send(
                subjects::SESSION_MESSAGE_RECEIVED,
                &json!({
                    "sessionId": session_id,
                    "namespace": namespace,
                    "messageData": message_data,
                }),
                id,
            ),
            SessionEvent::ReceiverMessage {
                session_id,
                request_id,
                message,
            } => outbound.send(
                subjects::RECEIVER_MESSAGE_RECEIVED,
                &json!({
                    "sessionId": session_id,
                    "requestId": request_id,
                    "messageData": message.to_string(),
                }),
                id,
            ),
        }

        if is_final {
            break;
        }
    }

    instances.remove_if(&instance_id, |_, instance| {
        matches!(instance, Instance::Session(s) if s.ptr_eq(&session))
    });
    log::debug!("[Router] Session instance {} finished", instance_id);
}
