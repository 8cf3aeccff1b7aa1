//! Cast transport: one TLS connection to a receiver, multiplexed into
//! virtual channels.
//!
//! # Lifecycle
//!
//! `connect()` opens the socket, creates the connection and heartbeat
//! channels to the platform receiver, sends `CONNECT` and a first `PING`,
//! then spawns three tasks:
//!
//! - **reader**: decodes frames and dispatches them to channels
//! - **writer**: owns the write half and drains the outbound queue in order
//! - **heartbeat**: sends `PING` every interval and watches for silence
//!
//! Teardown happens exactly once, whether triggered by `disconnect()`, a
//! receiver `CLOSE`, end of stream, an I/O error or a heartbeat timeout.
//! It invalidates every cached channel, ends their listeners and publishes
//! a single [`TransportEvent::Disconnected`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelKey, OutboundFrame, VirtualChannel, WriterHandle};
use super::codec::CastCodec;
use super::error::{TransportError, TransportResult};
use super::payload::{ConnectionMessage, HeartbeatMessage};
use super::proto::CastMessage;
use crate::protocol_constants::{
    BROADCAST_DESTINATION_ID, CONNECTION_NAMESPACE, DEFAULT_SENDER_ID, HEARTBEAT_INTERVAL,
    HEARTBEAT_NAMESPACE, HEARTBEAT_TIMEOUT_INTERVALS, PLATFORM_RECEIVER_ID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Connector seam
// ─────────────────────────────────────────────────────────────────────────────

/// Byte stream a transport runs over.
pub trait CastStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> CastStream for T {}

pub type BoxedStream = Box<dyn CastStream>;

/// Opens the byte stream to a receiver.
///
/// Production uses [`TlsConnector`](super::TlsConnector); tests substitute an
/// in-memory duplex stream.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxedStream>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Options & events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Default source id for channels created without an explicit one.
    pub source_id: String,
    /// Default destination id, normally the platform receiver.
    pub destination_id: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            source_id: DEFAULT_SENDER_ID.to_string(),
            destination_id: PLATFORM_RECEIVER_ID.to_string(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a transport went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Local,
    /// The receiver sent `CLOSE` on the platform connection.
    RemoteClose,
    /// The stream ended.
    Eof,
    /// Nothing was heard from the receiver for several heartbeat intervals.
    HeartbeatTimeout,
    /// Read or write failed.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Disconnected { reason: DisconnectReason },
}

/// Hook run on every heartbeat tick, after the platform `PING`.
pub type HeartbeatHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

struct TransportInner {
    options: TransportOptions,
    connector: Arc<dyn Connector>,
    state: Mutex<TransportState>,
    writer: Arc<WriterHandle>,
    channels: DashMap<ChannelKey, VirtualChannel>,
    events: broadcast::Sender<TransportEvent>,
    cancel: CancellationToken,
    heartbeat_hook: Mutex<Option<HeartbeatHook>>,
    last_seen: Mutex<Instant>,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
}

/// One connection to a Cast receiver. Cheap to clone.
#[derive(Clone)]
pub struct CastTransport {
    inner: Arc<TransportInner>,
}

impl CastTransport {
    pub fn new(options: TransportOptions, connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(TransportInner {
                options,
                connector,
                state: Mutex::new(TransportState::Idle),
                writer: Arc::new(WriterHandle::default()),
                channels: DashMap::new(),
                events,
                cancel: CancellationToken::new(),
                heartbeat_hook: Mutex::new(None),
                last_seen: Mutex::new(Instant::now()),
                disconnect_reason: Mutex::new(None),
            }),
        }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.inner.state.lock() == TransportState::Connected
    }

    /// Reason for the teardown, once the transport is closed.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.inner.disconnect_reason.lock().clone()
    }

    /// Subscribes to transport lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// Installs a hook run on every heartbeat tick. Used by owners of nested
    /// application connections to keep those alive too.
    pub fn set_heartbeat_hook(&self, hook: HeartbeatHook) {
        *self.inner.heartbeat_hook.lock() = Some(hook);
    }

    /// Connects to the receiver and starts the transport tasks.
    ///
    /// Errors before the handshake completes are returned here; errors after
    /// it surface as a [`TransportEvent::Disconnected`].
    pub async fn connect(&self, host: &str, port: u16) -> TransportResult<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                TransportState::Idle => *state = TransportState::Connecting,
                TransportState::Connecting | TransportState::Connected => {
                    return Err(TransportError::InvalidState("already connected"))
                }
                TransportState::Closed => return Err(TransportError::Closed),
            }
        }

        log::debug!("[Transport] Connecting to {}:{}", host, port);
        let connect = self.inner.connector.connect(host, port);
        let stream = match tokio::time::timeout(self.inner.options.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.inner.mark_closed();
                return Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
            Err(_) => {
                self.inner.mark_closed();
                return Err(TransportError::Timeout {
                    host: host.to_string(),
                    port,
                });
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock();
            if *state != TransportState::Connecting {
                return Err(TransportError::Closed);
            }
            self.inner.writer.install(frame_tx);
            *self.inner.last_seen.lock() = Instant::now();
            *state = TransportState::Connected;
        }

        tokio::spawn(run_writer(Arc::clone(&self.inner), write_half, frame_rx));
        tokio::spawn(run_reader(Arc::clone(&self.inner), read_half));

        let connection = self.channel(CONNECTION_NAMESPACE);
        let heartbeat = self.channel(HEARTBEAT_NAMESPACE);
        connection.send(&ConnectionMessage::connect())?;
        heartbeat.send(&HeartbeatMessage::Ping)?;

        tokio::spawn(run_heartbeat(Arc::clone(&self.inner), heartbeat));

        log::info!("[Transport] Connected to {}:{}", host, port);
        Ok(())
    }

    /// Channel on `namespace` using the default source and destination ids.
    pub fn channel(&self, namespace: &str) -> VirtualChannel {
        self.create_channel(namespace, None, None)
    }

    /// Returns the cached channel for the triple, creating it if needed.
    ///
    /// Creating a channel sends nothing. On a closed transport the returned
    /// channel is already invalid.
    pub fn create_channel(
        &self,
        namespace: &str,
        source_id: Option<&str>,
        destination_id: Option<&str>,
    ) -> VirtualChannel {
        let options = &self.inner.options;
        let key = ChannelKey::new(
            source_id.unwrap_or(&options.source_id),
            destination_id.unwrap_or(&options.destination_id),
            namespace,
        );
        self.inner.channel_for(key)
    }

    /// Disconnects. Idempotent.
    ///
    /// The heartbeat stops first, then `CLOSE` is queued ahead of the socket
    /// shutdown so the receiver sees a clean goodbye.
    pub fn disconnect(&self) {
        let connected = {
            let state = self.inner.state.lock();
            *state == TransportState::Connected
        };
        if connected {
            self.inner.cancel.cancel();
            let connection = self.channel(CONNECTION_NAMESPACE);
            if let Err(e) = connection.send(&ConnectionMessage::Close) {
                log::debug!("[Transport] Could not queue CLOSE: {}", e);
            }
        }
        self.inner.teardown(DisconnectReason::Local);
    }
}

impl TransportInner {
    fn channel_for(&self, key: ChannelKey) -> VirtualChannel {
        if *self.state.lock() == TransportState::Closed {
            let channel = VirtualChannel::new(key, Arc::clone(&self.writer));
            channel.invalidate();
            return channel;
        }
        self.channels
            .entry(key.clone())
            .or_insert_with(|| VirtualChannel::new(key, Arc::clone(&self.writer)))
            .clone()
    }

    fn mark_closed(&self) {
        *self.state.lock() = TransportState::Closed;
    }

    /// Runs exactly once per transport.
    fn teardown(&self, reason: DisconnectReason) {
        {
            let mut state = self.state.lock();
            if *state == TransportState::Closed {
                return;
            }
            *state = TransportState::Closed;
        }

        self.cancel.cancel();
        self.writer.close();
        for entry in self.channels.iter() {
            entry.value().invalidate();
        }
        self.channels.clear();

        match &reason {
            DisconnectReason::Local => log::info!("[Transport] Disconnected"),
            other => log::warn!("[Transport] Connection lost: {:?}", other),
        }
        *self.disconnect_reason.lock() = Some(reason.clone());
        let _ = self.events.send(TransportEvent::Disconnected { reason });
    }

    /// Routes one inbound frame.
    fn dispatch(&self, message: CastMessage) {
        *self.last_seen.lock() = Instant::now();

        let Some(text) = message.text_payload() else {
            log::debug!(
                "[Transport] Ignoring binary payload on {}",
                message.namespace
            );
            return;
        };
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!(
                    "[Transport] Dropping malformed payload on {}: {}",
                    message.namespace,
                    e
                );
                return;
            }
        };
        let payload_type = payload.get("type").and_then(Value::as_str);

        if message.namespace == HEARTBEAT_NAMESPACE {
            if payload_type == Some("PING") {
                let key = ChannelKey::new(
                    &self.options.source_id,
                    &message.source_id,
                    HEARTBEAT_NAMESPACE,
                );
                if let Err(e) = self.channel_for(key).send(&HeartbeatMessage::Pong) {
                    log::debug!("[Transport] Could not answer PING: {}", e);
                }
            }
            return;
        }

        if message.namespace == CONNECTION_NAMESPACE
            && message.source_id == self.options.destination_id
            && payload_type == Some("CLOSE")
        {
            self.teardown(DisconnectReason::RemoteClose);
            return;
        }

        let mut delivered = false;
        for entry in self.channels.iter() {
            let key = entry.key();
            if key.namespace == message.namespace
                && key.destination_id == message.source_id
                && (message.destination_id == BROADCAST_DESTINATION_ID
                    || key.source_id == message.destination_id)
            {
                delivered |= entry.value().deliver(payload.clone());
            }
        }
        if !delivered {
            log::trace!(
                "[Transport] No listener for {} ({} -> {})",
                message.namespace,
                message.source_id,
                message.destination_id
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn run_reader<R>(inner: Arc<TransportInner>, read_half: R)
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(read_half, CastCodec::default());
    let reason = loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break DisconnectReason::Local,
            frame = frames.next() => match frame {
                Some(Ok(message)) => inner.dispatch(message),
                Some(Err(e)) if e.is_peer_closed() => break DisconnectReason::Eof,
                Some(Err(e)) => break DisconnectReason::Error(e.to_string()),
                None => break DisconnectReason::Eof,
            }
        }
    };
    inner.teardown(reason);
}

async fn run_writer<W>(
    inner: Arc<TransportInner>,
    write_half: W,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(write_half, CastCodec::default());
    while let Some(OutboundFrame { message, ack }) = frames.recv().await {
        let result = sink.send(message).await;
        let failure = result.as_ref().err().map(|e| {
            if e.is_peer_closed() {
                DisconnectReason::Eof
            } else {
                DisconnectReason::Error(e.to_string())
            }
        });
        if let Some(ack) = ack {
            let _ = ack.send(result.map_err(TransportError::from));
        }
        if let Some(reason) = failure {
            log::warn!("[Transport] Write failed: {:?}", reason);
            inner.teardown(reason);
            break;
        }
    }
    if let Err(e) = sink.close().await {
        log::debug!("[Transport] Closing write half failed: {}", e);
    }
}

async fn run_heartbeat(inner: Arc<TransportInner>, heartbeat: VirtualChannel) {
    let period = inner.options.heartbeat_interval;
    let silence_limit = period * HEARTBEAT_TIMEOUT_INTERVALS;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = interval.tick() => {
                if inner.last_seen.lock().elapsed() > silence_limit {
                    inner.teardown(DisconnectReason::HeartbeatTimeout);
                    break;
                }
                if heartbeat.send(&HeartbeatMessage::Ping).is_err() {
                    break;
                }
                let hook = inner.heartbeat_hook.lock().clone();
                if let Some(hook) = hook {
                    hook();
                }
            }
        }
    }
    log::trace!("[Transport] Heartbeat stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory receiver used by transport, session and monitor tests.

    use super::*;
    use crate::cast::payload::HeartbeatMessage;
    use tokio::io::DuplexStream;

    /// Connector handing out one side of a duplex pipe; the other side is
    /// delivered to the test through `peers`.
    pub struct DuplexConnector {
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl DuplexConnector {
        pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (peers, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { peers }), rx)
        }
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        async fn connect(&self, _host: &str, _port: u16) -> io::Result<BoxedStream> {
            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            self.peers
                .send(theirs)
                .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no receiver"))?;
            Ok(Box::new(ours))
        }
    }

    /// Connector that never completes.
    pub struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(&self, _host: &str, _port: u16) -> io::Result<BoxedStream> {
            std::future::pending().await
        }
    }

    /// Receiver side of a duplex connection speaking Cast frames.
    pub struct FakeReceiver {
        reader: FramedRead<tokio::io::ReadHalf<DuplexStream>, CastCodec>,
        writer: FramedWrite<tokio::io::WriteHalf<DuplexStream>, CastCodec>,
    }

    impl FakeReceiver {
        pub fn new(stream: DuplexStream) -> Self {
            let (read_half, write_half) = tokio::io::split(stream);
            Self {
                reader: FramedRead::new(read_half, CastCodec::default()),
                writer: FramedWrite::new(write_half, CastCodec::default()),
            }
        }

        /// Next frame from the sender, or `None` once the sender hung up.
        pub async fn next(&mut self) -> Option<CastMessage> {
            self.reader.next().await.map(|frame| frame.unwrap())
        }

        /// Next frame that is not heartbeat traffic.
        pub async fn next_non_heartbeat(&mut self) -> Option<CastMessage> {
            loop {
                let message = self.next().await?;
                if message.namespace != HEARTBEAT_NAMESPACE {
                    return Some(message);
                }
            }
        }

        /// Next frame on `namespace`, as parsed JSON.
        pub async fn expect(&mut self, namespace: &str) -> (CastMessage, Value) {
            loop {
                let message = self.next().await.expect("sender hung up");
                if message.namespace == namespace {
                    let payload = serde_json::from_str(message.text_payload().unwrap()).unwrap();
                    return (message, payload);
                }
            }
        }

        pub async fn send(&mut self, source: &str, destination: &str, namespace: &str, payload: Value) {
            let message = CastMessage::json(source, destination, namespace, &payload).unwrap();
            self.writer.send(message).await.unwrap();
        }

        pub async fn ping(&mut self, destination: &str) {
            let ping = serde_json::to_value(HeartbeatMessage::Ping).unwrap();
            self.send(PLATFORM_RECEIVER_ID, destination, HEARTBEAT_NAMESPACE, ping)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{DuplexConnector, FakeReceiver, HangingConnector};
    use super::*;
    use crate::cast::CastCodecError;
    use crate::protocol_constants::RECEIVER_NAMESPACE;
    use serde_json::json;

    async fn connected() -> (CastTransport, FakeReceiver) {
        let (connector, mut peers) = DuplexConnector::new();
        let transport = CastTransport::new(TransportOptions::default(), connector);
        transport.connect("10.0.0.2", 8009).await.unwrap();
        let receiver = FakeReceiver::new(peers.recv().await.unwrap());
        (transport, receiver)
    }

    #[tokio::test]
    async fn connect_sends_connect_then_ping() {
        let (_transport, mut receiver) = connected().await;

        let (first, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
        assert_eq!(first.source_id, "sender-0");
        assert_eq!(first.destination_id, "receiver-0");
        assert_eq!(payload["type"], "CONNECT");

        let (_, ping) = receiver.expect(HEARTBEAT_NAMESPACE).await;
        assert_eq!(ping, json!({"type": "PING"}));
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let (_transport, mut receiver) = connected().await;
        receiver.expect(HEARTBEAT_NAMESPACE).await;

        receiver.ping("sender-0").await;
        let (pong, payload) = receiver.expect(HEARTBEAT_NAMESPACE).await;
        assert_eq!(pong.destination_id, "receiver-0");
        assert_eq!(payload, json!({"type": "PONG"}));
    }

    #[tokio::test]
    async fn create_channel_is_cached_per_triple() {
        let (transport, _receiver) = connected().await;
        let a = transport.channel(RECEIVER_NAMESPACE);
        let b = transport.create_channel(RECEIVER_NAMESPACE, Some("sender-0"), Some("receiver-0"));
        let c = transport.create_channel(RECEIVER_NAMESPACE, Some("sender-0"), Some("T1"));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[tokio::test]
    async fn routes_by_triple_and_broadcast_destination() {
        let (transport, mut receiver) = connected().await;
        let mut platform = transport.channel(RECEIVER_NAMESPACE).listen().unwrap();
        let mut app = transport
            .create_channel("urn:x-cast:custom", Some("sender-0"), Some("T1"))
            .listen()
            .unwrap();

        receiver
            .send("receiver-0", "sender-0", RECEIVER_NAMESPACE, json!({"type": "RECEIVER_STATUS"}))
            .await;
        receiver
            .send("T1", "*", "urn:x-cast:custom", json!({"hello": 1}))
            .await;
        receiver
            .send("T1", "sender-other", "urn:x-cast:custom", json!({"hello": 2}))
            .await;
        receiver
            .send("T1", "sender-0", "urn:x-cast:custom", json!({"hello": 3}))
            .await;

        assert_eq!(platform.recv().await.unwrap()["type"], "RECEIVER_STATUS");
        assert_eq!(app.recv().await.unwrap(), json!({"hello": 1}));
        assert_eq!(app.recv().await.unwrap(), json!({"hello": 3}));
    }

    #[tokio::test]
    async fn remote_close_tears_down_once() {
        let (transport, mut receiver) = connected().await;
        let mut events = transport.subscribe();
        let mut listener = transport.channel(RECEIVER_NAMESPACE).listen().unwrap();

        receiver
            .send("receiver-0", "sender-0", CONNECTION_NAMESPACE, json!({"type": "CLOSE"}))
            .await;

        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected {
                reason: DisconnectReason::RemoteClose
            }
        );
        assert_eq!(listener.recv().await, None);
        assert!(!transport.is_connected());

        transport.disconnect();
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn disconnect_sends_close_and_ends_stream() {
        let (transport, mut receiver) = connected().await;
        transport.disconnect();
        transport.disconnect();

        let mut saw_close = false;
        while let Some(message) = receiver.next().await {
            if message.namespace == CONNECTION_NAMESPACE
                && message.text_payload() == Some(r#"{"type":"CLOSE"}"#)
            {
                saw_close = true;
            }
        }
        assert!(saw_close);
        assert_eq!(transport.disconnect_reason(), Some(DisconnectReason::Local));
        assert!(!transport.channel(RECEIVER_NAMESPACE).is_valid());
    }

    #[tokio::test]
    async fn eof_is_reported() {
        let (transport, mut receiver) = connected().await;
        let mut events = transport.subscribe();
        receiver.expect(CONNECTION_NAMESPACE).await;
        receiver.expect(HEARTBEAT_NAMESPACE).await;
        drop(receiver);
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected {
                reason: DisconnectReason::Eof
            }
        );
    }

    #[tokio::test]
    async fn hang_up_with_frames_queued_is_reported_as_eof() {
        let (transport, receiver) = connected().await;
        let mut events = transport.subscribe();
        drop(receiver);
        // The writer may hit the closed pipe before the reader sees EOF.
        let _ = transport.channel(RECEIVER_NAMESPACE).send(&json!({"type": "GET_STATUS"}));
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected {
                reason: DisconnectReason::Eof
            }
        );
    }

    #[test]
    fn peer_hang_up_errors_are_classified() {
        let reset = CastCodecError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        let pipe = CastCodecError::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        let other = CastCodecError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(reset.is_peer_closed());
        assert!(pipe.is_peer_closed());
        assert!(!other.is_peer_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_reported() {
        let options = TransportOptions {
            connect_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let transport = CastTransport::new(options, Arc::new(HangingConnector));
        let err = transport.connect("10.0.0.2", 8009).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_receiver_times_out() {
        let (transport, _receiver) = connected().await;
        let mut events = transport.subscribe();
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Disconnected {
                reason: DisconnectReason::HeartbeatTimeout
            }
        );
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (transport, _receiver) = connected().await;
        let err = transport.connect("10.0.0.2", 8009).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
    }
}
