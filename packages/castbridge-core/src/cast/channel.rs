//! Virtual channels multiplexed over one Cast transport.
//!
//! A channel is the triple (source id, destination id, namespace). Channels
//! are cached by the transport, so requesting the same triple twice returns
//! the same channel. Each channel has exactly one inbound listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::error::{TransportError, TransportResult};
use super::proto::CastMessage;

/// Identity of a virtual channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
}

impl ChannelKey {
    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
        }
    }
}

/// A frame queued for the transport's writer task.
///
/// When `ack` is present the writer reports the outcome of the socket write.
pub(crate) struct OutboundFrame {
    pub message: CastMessage,
    pub ack: Option<oneshot::Sender<TransportResult<()>>>,
}

/// Reports the outcome of one queued frame's socket write.
pub type WriteAck = oneshot::Receiver<TransportResult<()>>;

/// Sender half of the transport's writer queue, shared with every channel.
///
/// Clearing it on teardown lets the writer task drain and exit even while
/// channels are still referenced elsewhere.
#[derive(Default)]
pub(crate) struct WriterHandle {
    tx: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
}

impl WriterHandle {
    pub fn new(tx: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Points the handle at a freshly started writer task.
    pub fn install(&self, tx: mpsc::UnboundedSender<OutboundFrame>) {
        *self.tx.lock() = Some(tx);
    }

    pub fn send(&self, frame: OutboundFrame) -> TransportResult<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    pub fn close(&self) {
        self.tx.lock().take();
    }
}

struct ChannelInner {
    key: ChannelKey,
    writer: Arc<WriterHandle>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    valid: AtomicBool,
}

/// Handle to one virtual channel. Cheap to clone.
#[derive(Clone)]
pub struct VirtualChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for VirtualChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualChannel")
            .field("key", &self.inner.key)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl VirtualChannel {
    pub(crate) fn new(key: ChannelKey, writer: Arc<WriterHandle>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChannelInner {
                key,
                writer,
                inbound_tx: Mutex::new(Some(tx)),
                inbound_rx: Mutex::new(Some(rx)),
                valid: AtomicBool::new(true),
            }),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.inner.key
    }

    pub fn namespace(&self) -> &str {
        &self.inner.key.namespace
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Takes the inbound listener. Only the first call returns `Some`.
    ///
    /// The listener ends once the transport tears down.
    pub fn listen(&self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.inner.inbound_rx.lock().take()
    }

    fn envelope(&self, text: String) -> CastMessage {
        let key = &self.inner.key;
        CastMessage::text(&key.source_id, &key.destination_id, &key.namespace, text)
    }

    fn enqueue(&self, text: String, ack: Option<oneshot::Sender<TransportResult<()>>>) -> TransportResult<()> {
        if !self.is_valid() {
            return Err(TransportError::Closed);
        }
        self.inner.writer.send(OutboundFrame {
            message: self.envelope(text),
            ack,
        })
    }

    /// Queues a JSON payload for sending. Fire-and-forget: success means the
    /// frame was queued, not written.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> TransportResult<()> {
        let text = serde_json::to_string(payload)?;
        self.enqueue(text, None)
    }

    /// Queues already-serialized JSON text.
    pub fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        self.enqueue(text.into(), None)
    }

    /// Queues already-serialized JSON text and returns a handle that
    /// resolves once the writer has written it to the socket.
    ///
    /// The frame takes its place in the queue before this returns, so frames
    /// queued from one task keep their order however the acks are awaited.
    pub fn send_text_tracked(&self, text: impl Into<String>) -> TransportResult<WriteAck> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(text.into(), Some(ack_tx))?;
        Ok(ack_rx)
    }

    /// Delivers an inbound payload to the listener. Returns `false` when the
    /// channel has been invalidated.
    pub(crate) fn deliver(&self, payload: Value) -> bool {
        match self.inner.inbound_tx.lock().as_ref() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Marks the channel unusable and ends its listener.
    pub(crate) fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
        self.inner.inbound_tx.lock().take();
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &VirtualChannel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
