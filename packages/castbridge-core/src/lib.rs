//! Castbridge Core - shared library for the Cast bridge.
//!
//! A browser extension cannot open raw TLS sockets, so this crate owns every
//! connection to Cast receivers and exposes them to the extension over a
//! length-prefixed JSON message channel (native messaging or a local
//! WebSocket daemon).
//!
//! # Architecture
//!
//! - [`framing`]: length-prefixed JSON frames for the extension channel
//! - [`cast`]: Cast v2 codec, TLS transport, virtual channels
//! - [`receiver`]: device model, registry and mDNS discovery
//! - [`session`]: launch/run/stop of one receiver application
//! - [`monitor`]: passive receiver and media status following
//! - [`router`]: dispatch of extension messages to sessions and monitors
//! - [`api`]: native messaging host loop and WebSocket daemon
//! - [`bootstrap`]: composition root
//!
//! # Abstraction Traits
//!
//! - [`Connector`](cast::Connector): opening sockets to receivers
//! - [`EventEmitter`](events::EventEmitter): emitting discovery and status events

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod cast;
pub mod error;
pub mod events;
pub mod framing;
pub mod monitor;
pub mod protocol_constants;
pub mod receiver;
pub mod router;
pub mod services;
pub mod session;
pub mod state;

// Re-export commonly used types at the crate root
pub use error::{BridgeError, BridgeResult, ErrorCode};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, DiscoveryEvent, EventEmitter, LoggingEventEmitter,
    StatusEvent,
};
pub use framing::{FrameError, JsonFrameCodec};
pub use receiver::{DeviceRegistry, Discovery, ReceiverDevice, ReceiverStatus};
pub use router::{BridgeMessage, BridgeRouter, RouterContext};
pub use session::{CastSession, PendingSend, SessionEvent, SessionOptions};
pub use state::{Config, DiscoveryConfig};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with_connector, BootstrappedServices};

// Re-export API types
pub use api::{
    bind_daemon, run_native_host, serve_daemon, DaemonState, ServerError, WsConnectionManager,
};
