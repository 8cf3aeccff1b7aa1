//! Cast sessions: launching an application on a receiver and relaying its
//! messages.
//!
//! A [`CastSession`] owns one [`CastTransport`] to the receiver. The platform
//! connection (`sender-0` → `receiver-0`) drives the launch; once the
//! application is running, an [`AppConnection`] to its transport id carries
//! namespace traffic over the same socket.
//!
//! Transitions live in the pure [`SessionMachine`]; this module's driver task
//! feeds it receiver messages and carries out the actions it returns.

mod event;
mod machine;
mod pending;

pub use event::{SessionEvent, SessionInfo, SessionUpdate};
pub use machine::{reasons, SessionAction, SessionMachine, SessionState};
pub use pending::PendingRequests;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cast::payload::{ReceiverResponse, VolumeRequest};
use crate::cast::{
    is_close, AppConnection, CastTransport, Connector, TransportError, TransportOptions,
    VirtualChannel, WriteAck,
};
use crate::protocol_constants::{PLATFORM_RECEIVER_ID, RECEIVER_NAMESPACE};
use crate::receiver::ReceiverDevice;
use crate::state::Config;

/// Errors returned to callers of session operations.
///
/// `Clone` so one teardown error can reject every pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session closed")]
    SessionClosed,

    #[error("session is not active")]
    NotActive,

    #[error("duplicate message id: {0}")]
    DuplicateMessageId(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::SessionClosed,
            other => Self::Transport(other.to_string()),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Parameters for one launch attempt.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub app_id: String,
    pub receiver: ReceiverDevice,
    pub source_id: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub launch_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &Config, app_id: impl Into<String>, receiver: ReceiverDevice) -> Self {
        Self {
            app_id: app_id.into(),
            receiver,
            source_id: config.session_source_id.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            connect_timeout: config.connect_timeout(),
            launch_timeout: config.launch_timeout(),
        }
    }
}

struct SessionInner {
    options: SessionOptions,
    machine: Mutex<SessionMachine>,
    transport: CastTransport,
    receiver_channel: VirtualChannel,
    app: Arc<Mutex<Option<Arc<AppConnection>>>>,
    namespace_channels: DashMap<String, VirtualChannel>,
    pending: PendingRequests,
    caller_requests: Mutex<HashSet<u32>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    torn_down: AtomicBool,
}

/// One launch attempt and, if it succeeds, the running session.
#[derive(Clone)]
pub struct CastSession {
    inner: Arc<SessionInner>,
}

impl CastSession {
    /// Creates a session. Nothing happens on the network until [`start`].
    ///
    /// [`start`]: CastSession::start
    pub fn new(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
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
        let machine = SessionMachine::new(&options.app_id, &options.receiver.friendly_name);
        let (events, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            inner: Arc::new(SessionInner {
                options,
                machine: Mutex::new(machine),
                transport,
                receiver_channel,
                app: Arc::new(Mutex::new(None)),
                namespace_channels: DashMap::new(),
                pending: PendingRequests::default(),
                caller_requests: Mutex::new(HashSet::new()),
                events,
                torn_down: AtomicBool::new(false),
            }),
        };
        (session, events_rx)
    }

    /// Spawns the driver task: connect, launch, then relay until stopped.
    pub fn start(&self) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    pub fn app_id(&self) -> &str {
        &self.inner.options.app_id
    }

    pub fn receiver(&self) -> &ReceiverDevice {
        &self.inner.options.receiver
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.machine.lock().state()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.machine.lock().session_id().map(str::to_string)
    }

    /// True when both handles drive the same session.
    pub fn ptr_eq(&self, other: &CastSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Queues `message_data` (JSON text) on an application namespace.
    ///
    /// The frame is queued before this returns, so sends made one after the
    /// other reach the receiver in that order.
    pub fn send_message(
        &self,
        namespace: &str,
        message_data: String,
        message_id: &str,
    ) -> SessionResult<PendingSend> {
        let (session_id, transport_id) = {
            let machine = self.inner.machine.lock();
            if machine.state() != SessionState::Active {
                return Err(SessionError::NotActive);
            }
            (
                machine.session_id().unwrap_or_default().to_string(),
                machine.transport_id().unwrap_or_default().to_string(),
            )
        };
        let channel = self.namespace_channel(namespace, &session_id, &transport_id);
        self.send_correlated(&channel, message_data, message_id)
    }

    /// Queues a platform receiver message stamped with the next request id.
    /// Replies echoing that id are emitted as [`SessionEvent::ReceiverMessage`].
    pub fn send_receiver_message(&self, message: Value, message_id: &str) -> SessionResult<PendingSend> {
        let Value::Object(mut fields) = message else {
            return Err(SessionError::InvalidMessage(
                "receiver messages must be JSON objects".into(),
            ));
        };
        let request_id = {
            let mut machine = self.inner.machine.lock();
            if machine.state() != SessionState::Active {
                return Err(SessionError::NotActive);
            }
            machine.next_request_id()
        };
        fields.insert("requestId".into(), Value::from(request_id));
        self.inner.caller_requests.lock().insert(request_id);

        let text = Value::Object(fields).to_string();
        match self.send_correlated(&self.inner.receiver_channel, text, message_id) {
            Ok(mut pending) => {
                pending.request_id = Some(request_id);
                pending.caller_request = true;
                Ok(pending)
            }
            Err(e) => {
                self.inner.caller_requests.lock().remove(&request_id);
                Err(e)
            }
        }
    }

    /// Queues `SET_VOLUME`.
    pub fn set_volume(&self, volume: VolumeRequest, message_id: &str) -> SessionResult<PendingSend> {
        let request = self
            .inner
            .machine
            .lock()
            .volume_request(volume)
            .ok_or(SessionError::NotActive)?;
        let text = serde_json::to_string(&request)
            .map_err(|e| SessionError::InvalidMessage(e.to_string()))?;
        let mut pending = self.send_correlated(&self.inner.receiver_channel, text, message_id)?;
        pending.request_id = Some(request.request_id());
        Ok(pending)
    }

    /// Stops the application (when running) and ends the session.
    pub fn stop(&self) {
        let (request, actions) = self.inner.machine.lock().request_stop();
        if let Some(request) = request {
            log::info!("[Session] Stopping {}", self.inner.options.app_id);
            if let Err(e) = self.inner.receiver_channel.send(&request) {
                log::debug!("[Session] STOP not sent: {}", e);
            }
        }
        self.apply(actions);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Driver
    // ─────────────────────────────────────────────────────────────────────────

    async fn run(self) {
        let inner = &self.inner;
        let Some(mut receiver_rx) = inner.receiver_channel.listen() else {
            log::error!("[Session] Receiver listener already taken");
            return;
        };

        let device = &inner.options.receiver;
        if let Err(e) = inner.transport.connect(&device.host, device.port).await {
            log::warn!(
                "[Session] Could not connect to {} ({}:{}): {}",
                device.friendly_name,
                device.host,
                device.port,
                e
            );
            let actions = inner.machine.lock().on_connect_failed();
            self.apply(actions);
            return;
        }

        let app_slot = Arc::clone(&inner.app);
        inner.transport.set_heartbeat_hook(Arc::new(move || {
            if let Some(app) = app_slot.lock().as_ref() {
                app.ping();
            }
        }));

        let requests = inner.machine.lock().begin_launch();
        for request in &requests {
            if let Err(e) = inner.receiver_channel.send(request) {
                log::warn!("[Session] Failed to send {:?}: {}", request, e);
            }
        }
        log::info!(
            "[Session] Launching {} on {}",
            inner.options.app_id,
            device.friendly_name
        );

        let launch_deadline = tokio::time::sleep(inner.options.launch_timeout);
        tokio::pin!(launch_deadline);
        let mut app_rx: Option<mpsc::UnboundedReceiver<Value>> = None;

        loop {
            let awaiting = self.state() == SessionState::AwaitingLaunch;
            tokio::select! {
                payload = receiver_rx.recv() => match payload {
                    Some(payload) => {
                        if let Some(rx) = self.handle_receiver_payload(payload) {
                            app_rx = Some(rx);
                        }
                    }
                    None => {
                        log::info!(
                            "[Session] Platform connection closed: {:?}",
                            inner.transport.disconnect_reason()
                        );
                        let actions = inner.machine.lock().on_connection_lost();
                        self.apply(actions);
                    }
                },
                payload = recv_optional(&mut app_rx) => match payload {
                    Some(payload) if is_close(&payload) => {
                        log::info!("[Session] Application closed its connection");
                        let actions = inner.machine.lock().on_connection_lost();
                        self.apply(actions);
                    }
                    Some(_) => {}
                    None => app_rx = None,
                },
                _ = &mut launch_deadline, if awaiting => {
                    let actions = inner.machine.lock().on_launch_timeout();
                    self.apply(actions);
                }
            }

            if self.state().is_terminal() {
                break;
            }
        }

        self.teardown();
        log::debug!("[Session] Driver for {} finished", inner.options.app_id);
    }

    fn handle_receiver_payload(&self, payload: Value) -> Option<mpsc::UnboundedReceiver<Value>> {
        let response = ReceiverResponse::parse(payload.clone());
        let (actions, session_id) = {
            let mut machine = self.inner.machine.lock();
            let actions = match &response {
                ReceiverResponse::ReceiverStatus { request_id, status } => {
                    machine.on_receiver_status(*request_id, status)
                }
                ReceiverResponse::LaunchError { request_id, reason }
                | ReceiverResponse::InvalidRequest { request_id, reason } => {
                    machine.on_launch_error(*request_id, reason.clone())
                }
                ReceiverResponse::Other => Vec::new(),
            };
            (actions, machine.session_id().map(str::to_string))
        };

        if let (Some(request_id), Some(session_id)) = (response.request_id(), session_id) {
            if self.inner.caller_requests.lock().remove(&request_id) {
                let _ = self.inner.events.send(SessionEvent::ReceiverMessage {
                    session_id,
                    request_id,
                    message: payload,
                });
            }
        }

        self.apply(actions)
    }

    /// Carries out actions. Returns the application connection listener when
    /// one was opened.
    fn apply(&self, actions: Vec<SessionAction>) -> Option<mpsc::UnboundedReceiver<Value>> {
        let mut opened = None;
        for action in actions {
            match action {
                SessionAction::OpenAppConnection { transport_id } => {
                    match AppConnection::open(
                        &self.inner.transport,
                        &self.inner.options.source_id,
                        &transport_id,
                    ) {
                        Ok(app) => {
                            opened = app.listen();
                            *self.inner.app.lock() = Some(Arc::new(app));
                        }
                        Err(e) => log::warn!(
                            "[Session] Could not open app connection to {}: {}",
                            transport_id,
                            e
                        ),
                    }
                }
                SessionAction::Emit(event) => {
                    if let SessionEvent::Created(info) = &event {
                        log::info!(
                            "[Session] Session {} active on {}",
                            info.session_id,
                            info.receiver_friendly_name
                        );
                    }
                    let _ = self.inner.events.send(event);
                }
                SessionAction::Close => self.teardown(),
            }
        }
        opened
    }

    /// Releases everything the session holds. Runs once.
    fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.namespace_channels.clear();
        let rejected = self.inner.pending.reject_all(SessionError::SessionClosed);
        if rejected > 0 {
            log::debug!("[Session] Rejected {} pending request(s)", rejected);
        }
        if let Some(app) = self.inner.app.lock().take() {
            app.close();
        }
        self.inner.transport.disconnect();
    }

    /// Cached channel for an application namespace. The first call registers
    /// a forwarder that relays inbound messages as session events.
    fn namespace_channel(&self, namespace: &str, session_id: &str, transport_id: &str) -> VirtualChannel {
        self.inner
            .namespace_channels
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let channel = self.inner.transport.create_channel(
                    namespace,
                    Some(&self.inner.options.source_id),
                    Some(transport_id),
                );
                if let Some(mut rx) = channel.listen() {
                    let events = self.inner.events.clone();
                    let session_id = session_id.to_string();
                    let namespace = namespace.to_string();
                    tokio::spawn(async move {
                        while let Some(payload) = rx.recv().await {
                            let event = SessionEvent::MessageReceived {
                                session_id: session_id.clone(),
                                namespace: namespace.clone(),
                                message_data: payload.to_string(),
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    });
                }
                channel
            })
            .clone()
    }

    /// Registers `message_id` and queues the frame.
    fn send_correlated(
        &self,
        channel: &VirtualChannel,
        text: String,
        message_id: &str,
    ) -> SessionResult<PendingSend> {
        let outcome = self.inner.pending.register(message_id)?;
        match channel.send_text_tracked(text) {
            Ok(ack) => Ok(PendingSend {
                session: self.clone(),
                message_id: message_id.to_string(),
                request_id: None,
                caller_request: false,
                ack,
                outcome,
            }),
            Err(e) => {
                let error = SessionError::from(e);
                self.inner.pending.resolve(message_id, Err(error.clone()));
                Err(error)
            }
        }
    }
}

/// A send already queued on its channel.
///
/// The registered message id stays pending until the frame is written or the
/// session tears down, whichever comes first.
#[must_use = "a queued send reports its outcome only through `written`"]
pub struct PendingSend {
    session: CastSession,
    message_id: String,
    request_id: Option<u32>,
    caller_request: bool,
    ack: WriteAck,
    outcome: oneshot::Receiver<SessionResult<()>>,
}

impl PendingSend {
    /// Request id stamped on a platform receiver message.
    pub fn request_id(&self) -> Option<u32> {
        self.request_id
    }

    /// Waits until the frame has been written, or the session has closed.
    pub async fn written(self) -> SessionResult<()> {
        let Self {
            session,
            message_id,
            request_id,
            caller_request,
            ack,
            mut outcome,
        } = self;
        let inner = &session.inner;

        let result = tokio::select! {
            biased;
            rejected = &mut outcome => rejected.unwrap_or(Err(SessionError::SessionClosed)),
            written = ack => {
                let written = written
                    .unwrap_or(Err(TransportError::Closed))
                    .map_err(SessionError::from);
                inner.pending.resolve(&message_id, written);
                outcome.await.unwrap_or(Err(SessionError::SessionClosed))
            }
        };

        if result.is_err() && caller_request {
            if let Some(request_id) = request_id {
                inner.caller_requests.lock().remove(&request_id);
            }
        }
        result
    }
}

async fn recv_optional(rx: &mut Option<mpsc::UnboundedReceiver<Value>>) -> Option<Value> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::transport::testing::{DuplexConnector, FakeReceiver};
    use crate::protocol_constants::{CONNECTION_NAMESPACE, MEDIA_NAMESPACE};
    use crate::receiver::Capabilities;
    use serde_json::json;

    fn device() -> ReceiverDevice {
        ReceiverDevice {
            id: "dev-1".into(),
            friendly_name: "Living Room".into(),
            model_name: None,
            host: "10.0.0.5".into(),
            port: 8009,
            capabilities: Capabilities::VIDEO_OUT | Capabilities::AUDIO_OUT,
            status: None,
        }
    }

    fn options() -> SessionOptions {
        SessionOptions::from_config(&Config::default(), "ABCD", device())
    }

    fn running_status(request_id: u32) -> Value {
        json!({
            "type": "RECEIVER_STATUS",
            "requestId": request_id,
            "status": {
                "applications": [{
                    "appId": "ABCD",
                    "sessionId": "S1",
                    "transportId": "T1",
                    "displayName": "Test",
                    "isIdleScreen": false,
                    "namespaces": [{"name": "urn:x-cast:com.example"}]
                }],
                "volume": {"level": 0.5, "muted": false}
            }
        })
    }

    /// Starts a session and walks the fake receiver through the launch.
    async fn launched() -> (CastSession, mpsc::UnboundedReceiver<SessionEvent>, FakeReceiver) {
        let (connector, mut peers) = DuplexConnector::new();
        let (session, mut events) = CastSession::new(options(), connector);
        session.start();
        let mut receiver = FakeReceiver::new(peers.recv().await.unwrap());

        let (_, probe) = receiver.expect(RECEIVER_NAMESPACE).await;
        assert_eq!(probe, json!({"type": "GET_STATUS", "requestId": 0}));
        let (_, launch) = receiver.expect(RECEIVER_NAMESPACE).await;
        assert_eq!(launch, json!({"type": "LAUNCH", "appId": "ABCD", "requestId": 1}));

        receiver
            .send("receiver-0", "sender-0", RECEIVER_NAMESPACE, running_status(1))
            .await;

        match events.recv().await.unwrap() {
            SessionEvent::Created(info) => {
                assert_eq!(info.session_id, "S1");
                assert_eq!(info.transport_id, "T1");
                assert_eq!(info.receiver_friendly_name, "Living Room");
            }
            other => panic!("expected Created, got {other:?}"),
        }
        (session, events, receiver)
    }

    #[tokio::test]
    async fn launch_opens_app_connection_to_transport_id() {
        let (session, _events, mut receiver) = launched().await;
        assert_eq!(session.state(), SessionState::Active);

        loop {
            let (message, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
            if message.destination_id == "T1" {
                assert_eq!(payload["type"], "CONNECT");
                break;
            }
        }
    }

    #[tokio::test]
    async fn status_without_app_stops_session_and_rejects_pending() {
        let (session, mut events, mut receiver) = launched().await;

        receiver
            .send(
                "receiver-0",
                "sender-0",
                RECEIVER_NAMESPACE,
                json!({"type": "RECEIVER_STATUS", "requestId": 0, "status": {"volume": {"level": 0.5}}}),
            )
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped {
                session_id: "S1".into()
            }
        );
        assert_eq!(session.state(), SessionState::Stopped);
        let err = session
            .send_message(MEDIA_NAMESPACE, "{}".into(), "late")
            .err()
            .unwrap();
        assert_eq!(err, SessionError::NotActive);
        assert!(session.inner.pending.is_empty());
    }

    #[tokio::test]
    async fn stop_rejects_an_unwritten_send_once() {
        let (session, mut events, _receiver) = launched().await;
        // Nothing reads the receiver side, so the pipe fills and the writer
        // stalls on the second frame.
        let big = format!("\"{}\"", "x".repeat(40 * 1024));
        let first = session
            .send_message("urn:x-cast:com.example", big.clone(), "m1")
            .unwrap();
        let stalled = session
            .send_message("urn:x-cast:com.example", big.clone(), "m2")
            .unwrap();
        let queued = session
            .send_message("urn:x-cast:com.example", big, "m3")
            .unwrap();
        first.written().await.unwrap();
        assert_eq!(session.inner.pending.len(), 2);

        session.stop();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped {
                session_id: "S1".into()
            }
        );
        assert_eq!(stalled.written().await, Err(SessionError::SessionClosed));
        assert_eq!(queued.written().await, Err(SessionError::SessionClosed));
        assert!(session.inner.pending.is_empty());
        assert!(!session.inner.pending.resolve("m2", Ok(())));
    }

    #[tokio::test]
    async fn consecutive_sends_keep_their_order() {
        let (session, _events, mut receiver) = launched().await;
        let sends: Vec<PendingSend> = (0..50)
            .map(|seq| {
                session
                    .send_message("urn:x-cast:com.example", json!({"seq": seq}).to_string(), &format!("m{seq}"))
                    .unwrap()
            })
            .collect();
        for seq in 0..50 {
            let (_, payload) = receiver.expect("urn:x-cast:com.example").await;
            assert_eq!(payload["seq"], seq);
        }
        for send in sends {
            send.written().await.unwrap();
        }
    }

    #[tokio::test]
    async fn namespace_messages_are_relayed_both_ways() {
        let (session, mut events, mut receiver) = launched().await;

        session
            .send_message("urn:x-cast:com.example", r#"{"hello":"world"}"#.into(), "m1")
            .unwrap()
            .written()
            .await
            .unwrap();
        let (message, payload) = receiver.expect("urn:x-cast:com.example").await;
        assert_eq!(message.destination_id, "T1");
        assert_eq!(payload, json!({"hello": "world"}));

        receiver
            .send("T1", "*", "urn:x-cast:com.example", json!({"reply": 1}))
            .await;
        match events.recv().await.unwrap() {
            SessionEvent::MessageReceived {
                session_id,
                namespace,
                message_data,
            } => {
                assert_eq!(session_id, "S1");
                assert_eq!(namespace, "urn:x-cast:com.example");
                assert_eq!(message_data, r#"{"reply":1}"#);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn receiver_messages_continue_request_ids() {
        let (session, mut events, mut receiver) = launched().await;

        let pending = session
            .send_receiver_message(json!({"type": "GET_STATUS"}), "r1")
            .unwrap();
        assert_eq!(pending.request_id(), Some(2));
        pending.written().await.unwrap();
        let (_, payload) = receiver.expect(RECEIVER_NAMESPACE).await;
        assert_eq!(payload, json!({"type": "GET_STATUS", "requestId": 2}));

        receiver
            .send("receiver-0", "sender-0", RECEIVER_NAMESPACE, running_status(2))
            .await;
        let mut saw_reply = false;
        for _ in 0..2 {
            if let SessionEvent::ReceiverMessage { request_id, .. } = events.recv().await.unwrap() {
                assert_eq!(request_id, 2);
                saw_reply = true;
            }
        }
        assert!(saw_reply);
    }

    #[tokio::test]
    async fn launch_error_fails_session() {
        let (connector, mut peers) = DuplexConnector::new();
        let (session, mut events) = CastSession::new(options(), connector);
        session.start();
        let mut receiver = FakeReceiver::new(peers.recv().await.unwrap());
        receiver.expect(RECEIVER_NAMESPACE).await;
        receiver.expect(RECEIVER_NAMESPACE).await;

        receiver
            .send(
                "receiver-0",
                "sender-0",
                RECEIVER_NAMESPACE,
                json!({"type": "LAUNCH_ERROR", "requestId": 1, "reason": "NOT_FOUND"}),
            )
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LaunchFailed {
                app_id: "ABCD".into(),
                reason: "NOT_FOUND".into()
            }
        );
        assert_eq!(session.state(), SessionState::LaunchError);
    }

    #[tokio::test]
    async fn stop_sends_stop_then_close() {
        let (session, mut events, mut receiver) = launched().await;
        session.stop();

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped {
                session_id: "S1".into()
            }
        );
        let (_, stop) = receiver.expect(RECEIVER_NAMESPACE).await;
        assert_eq!(stop, json!({"type": "STOP", "sessionId": "S1", "requestId": 2}));

        let mut closed_app = false;
        while let Some(message) = receiver.next_non_heartbeat().await {
            if message.namespace == CONNECTION_NAMESPACE && message.destination_id == "T1" {
                let payload: Value = serde_json::from_str(message.text_payload().unwrap()).unwrap();
                closed_app |= is_close(&payload);
            }
        }
        assert!(closed_app);
    }

    #[tokio::test]
    async fn app_close_stops_session() {
        let (session, mut events, mut receiver) = launched().await;
        receiver
            .send("T1", "sender-0", CONNECTION_NAMESPACE, json!({"type": "CLOSE"}))
            .await;
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped {
                session_id: "S1".into()
            }
        );
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn connect_failure_reports_launch_failure() {
        let (connector, peers) = DuplexConnector::new();
        drop(peers);
        let (session, mut events) = CastSession::new(options(), connector);
        session.start();
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LaunchFailed {
                app_id: "ABCD".into(),
                reason: reasons::CONNECTION_FAILED.into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn launch_times_out() {
        let (connector, mut peers) = DuplexConnector::new();
        let (session, mut events) = CastSession::new(options(), connector);
        session.start();
        let mut receiver = FakeReceiver::new(peers.recv().await.unwrap());
        // Keep answering heartbeats so only the launch deadline can fire.
        tokio::spawn(async move {
            while let Some(message) = receiver.next().await {
                if message.namespace == crate::protocol_constants::HEARTBEAT_NAMESPACE {
                    receiver
                        .send(
                            "receiver-0",
                            "sender-0",
                            crate::protocol_constants::HEARTBEAT_NAMESPACE,
                            json!({"type": "PONG"}),
                        )
                        .await;
                }
            }
        });

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LaunchFailed {
                app_id: "ABCD".into(),
                reason: reasons::TIMEOUT.into()
            }
        );
        assert_eq!(session.state(), SessionState::LaunchError);
    }
}
