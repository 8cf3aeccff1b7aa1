//! Centralized error types for the Cast bridge core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps every layer's error to a machine-readable code via [`ErrorCode`]
//! - Collapses layer errors into [`BridgeError`] at the composition boundary

use serde::Serialize;
use thiserror::Error;

use crate::cast::{CastCodecError, TransportError};
use crate::framing::FrameError;
use crate::receiver::DiscoveryError;
use crate::session::SessionError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for bridge responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for FrameError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "frame_io_failed",
            Self::TooLarge { .. } => "frame_too_large",
            Self::Serialize(_) => "frame_serialize_failed",
        }
    }
}

impl ErrorCode for CastCodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "cast_io_failed",
            Self::FrameTooLarge { .. } => "cast_frame_too_large",
            Self::Decode(_) => "cast_decode_failed",
            Self::Encode(_) => "cast_encode_failed",
        }
    }
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect_failed",
            Self::Timeout { .. } => "connect_timeout",
            Self::Tls(_) => "tls_configuration_failed",
            Self::InvalidState(_) => "invalid_transport_state",
            Self::Closed => "transport_closed",
            Self::Serialize(_) => "payload_serialize_failed",
            Self::Codec(err) => err.code(),
        }
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::SessionClosed => "session_closed",
            Self::NotActive => "session_not_active",
            Self::DuplicateMessageId(_) => "duplicate_message_id",
            Self::InvalidMessage(_) => "invalid_message",
            Self::Transport(_) => "transport_error",
        }
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::MdnsDaemon(_) => "mdns_daemon_failed",
            Self::Browse(_) => "mdns_browse_failed",
            Self::Disabled => "discovery_disabled",
        }
    }
}

/// Application-wide error type for the Cast bridge.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// Receiver discovery failed (mDNS/network issues).
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Connection to a receiver failed or was lost.
    #[error("Transport failed: {0}")]
    Transport(String),

    /// Session-level operation failed.
    #[error("Session failed: {0}")]
    Session(String),

    /// Bridge channel framing failed.
    #[error("Framing failed: {0}")]
    Frame(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Bridge configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns a machine-readable error code for bridge responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery_failed",
            Self::Transport(_) => "transport_failed",
            Self::Session(_) => "session_failed",
            Self::Frame(_) => "framing_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

// Re-export Result type aliases from their defining modules
pub use crate::cast::TransportResult;
pub use crate::receiver::DiscoveryResult;
pub use crate::session::SessionResult;

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<SessionError> for BridgeError {
    fn from(err: SessionError) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<DiscoveryError> for BridgeError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(err.to_string())
    }
}

impl From<FrameError> for BridgeError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
