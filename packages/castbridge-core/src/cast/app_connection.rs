use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;

use super::channel::VirtualChannel;
use super::error::TransportResult;
use super::payload::{ConnectionMessage, HeartbeatMessage};
use super::transport::CastTransport;
use crate::protocol_constants::{CONNECTION_NAMESPACE, HEARTBEAT_NAMESPACE};

/// Virtual connection to a running application, addressed by its transport
/// id over the receiver's existing socket.
///
/// Opening sends `CONNECT` to the application. The owner keeps it alive by
/// calling [`ping`](Self::ping) from the transport's heartbeat hook, and
/// ends it with [`close`](Self::close).
pub struct AppConnection {
    transport_id: String,
    connection: VirtualChannel,
    heartbeat: VirtualChannel,
    closed: AtomicBool,
}

impl AppConnection {
    pub fn open(
        transport: &CastTransport,
        source_id: &str,
        transport_id: &str,
    ) -> TransportResult<Self> {
        let connection =
            transport.create_channel(CONNECTION_NAMESPACE, Some(source_id), Some(transport_id));
        let heartbeat =
            transport.create_channel(HEARTBEAT_NAMESPACE, Some(source_id), Some(transport_id));
        connection.send(&ConnectionMessage::connect())?;
        log::debug!("[Transport] Opened app connection to {}", transport_id);

        Ok(Self {
            transport_id: transport_id.to_string(),
            connection,
            heartbeat,
            closed: AtomicBool::new(false),
        })
    }

    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Listener for the application's connection namespace, used to notice a
    /// `CLOSE` from the application side. Only the first call returns `Some`.
    pub fn listen(&self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.connection.listen()
    }

    pub fn ping(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.heartbeat.send(&HeartbeatMessage::Ping) {
            log::trace!("[Transport] App heartbeat to {} failed: {}", self.transport_id, e);
        }
    }

    /// Sends `CLOSE` to the application. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.connection.send(&ConnectionMessage::Close) {
            log::trace!("[Transport] App CLOSE to {} not sent: {}", self.transport_id, e);
        }
        log::debug!("[Transport] Closed app connection to {}", self.transport_id);
    }
}

/// `true` when a connection-namespace payload is a `CLOSE`.
pub fn is_close(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some("CLOSE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::transport::testing::{DuplexConnector, FakeReceiver};
    use crate::cast::TransportOptions;
    use serde_json::json;

    #[tokio::test]
    async fn open_ping_close_address_the_transport_id() {
        let (connector, mut peers) = DuplexConnector::new();
        let transport = CastTransport::new(TransportOptions::default(), connector);
        transport.connect("10.0.0.2", 8009).await.unwrap();
        let mut receiver = FakeReceiver::new(peers.recv().await.unwrap());
        // Platform CONNECT.
        receiver.expect(CONNECTION_NAMESPACE).await;

        let app = AppConnection::open(&transport, "sender-0", "T1").unwrap();
        let (connect, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
        assert_eq!(connect.destination_id, "T1");
        assert_eq!(payload["type"], "CONNECT");

        app.ping();
        loop {
            let (ping, _) = receiver.expect(HEARTBEAT_NAMESPACE).await;
            if ping.destination_id == "T1" {
                break;
            }
        }

        app.close();
        app.close();
        let (close, payload) = receiver.expect(CONNECTION_NAMESPACE).await;
        assert_eq!(close.destination_id, "T1");
        assert_eq!(payload, json!({"type": "CLOSE"}));
    }

    #[test]
    fn detects_close_payloads() {
        assert!(is_close(&json!({"type": "CLOSE", "reasonCode": 1})));
        assert!(!is_close(&json!({"type": "CONNECT"})));
    }
}
