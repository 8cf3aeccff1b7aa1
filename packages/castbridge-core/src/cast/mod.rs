//! Cast v2 protocol client.
//!
//! This module provides:
//! - [`CastMessage`] and [`CastCodec`] for the protobuf wire format
//! - [`CastTransport`] multiplexing [`VirtualChannel`]s over one connection
//! - [`AppConnection`] for talking to a running receiver application
//! - [`payload`] types for the well-known namespaces

mod app_connection;
mod channel;
mod codec;
mod error;
pub mod payload;
mod proto;
mod tls;
pub(crate) mod transport;

pub use app_connection::{is_close, AppConnection};
pub use channel::{ChannelKey, VirtualChannel, WriteAck};
pub use codec::CastCodec;
pub use error::{CastCodecError, TransportError, TransportResult};
pub use proto::{CastMessage, PayloadType, ProtocolVersion};
pub use tls::TlsConnector;
pub use transport::{
    BoxedStream, CastStream, CastTransport, Connector, DisconnectReason, HeartbeatHook,
    TransportEvent, TransportOptions,
};
