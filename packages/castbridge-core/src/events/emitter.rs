//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and per-connection delivery.

use super::{DiscoveryEvent, StatusEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// Discovery and status monitors use this trait to emit events, decoupling
/// them from how events reach the extension (broadcast to every connection,
/// or scoped to one bridge instance).
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn lost(&self, id: String) {
///         self.emitter.emit_discovery(DiscoveryEvent::DeviceDown { device_id: id });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a discovery event.
    fn emit_discovery(&self, event: DiscoveryEvent);

    /// Emits a receiver or media status event.
    fn emit_status(&self, event: StatusEvent);
}

/// No-op emitter for tests and for monitors nobody listens to.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_discovery(&self, _event: DiscoveryEvent) {}

    fn emit_status(&self, _event: StatusEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_discovery(&self, event: DiscoveryEvent) {
        tracing::debug!(?event, "discovery_event");
    }

    fn emit_status(&self, event: StatusEvent) {
        tracing::debug!(?event, "status_event");
    }
}
