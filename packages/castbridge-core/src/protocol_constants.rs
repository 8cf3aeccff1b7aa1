//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Cast v2 protocol, the browser native
//! messaging protocol, or the bridge's contract with the extension. Changing
//! them breaks interoperability with receivers or with the extension.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Cast namespaces
// ─────────────────────────────────────────────────────────────────────────────

/// Virtual connection management (`CONNECT` / `CLOSE`).
pub const CONNECTION_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";

/// Keep-alive (`PING` / `PONG`).
pub const HEARTBEAT_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

/// Platform receiver control (`LAUNCH`, `STOP`, `GET_STATUS`, `RECEIVER_STATUS`, ...).
pub const RECEIVER_NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";

/// Default media channel (`LOAD`, `MEDIA_STATUS`, ...).
pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

// ─────────────────────────────────────────────────────────────────────────────
// Cast endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Destination id of the receiver platform itself.
pub const PLATFORM_RECEIVER_ID: &str = "receiver-0";

/// Source id used by sessions.
pub const DEFAULT_SENDER_ID: &str = "sender-0";

/// Source id used by passive status monitors, distinct from any session.
pub const MONITOR_SENDER_ID: &str = "sender-monitor";

/// Destination id receivers use for messages addressed to every sender.
pub const BROADCAST_DESTINATION_ID: &str = "*";

/// User agent announced in `CONNECT` handshakes.
pub const USER_AGENT: &str = concat!("castbridge/", env!("CARGO_PKG_VERSION"));

// ─────────────────────────────────────────────────────────────────────────────
// Cast wire framing
// ─────────────────────────────────────────────────────────────────────────────

/// Cast frames are prefixed by a big endian u32 length.
pub const CAST_FRAME_HEADER_LENGTH: usize = 4;

/// Max message size is [64KB](https://developers.google.com/cast/docs/reference/messages).
pub const CAST_MAX_MESSAGE_LENGTH: usize = 64 << 10;

// ─────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between `PING` messages on every transport.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);

/// Number of silent heartbeat intervals after which a receiver is considered gone.
pub const HEARTBEAT_TIMEOUT_INTERVALS: u32 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Native messaging
// ─────────────────────────────────────────────────────────────────────────────

/// Native messaging frames are prefixed by a little endian u32 length.
pub const NATIVE_FRAME_HEADER_LENGTH: usize = 4;

/// Largest frame a browser will send to a native host (64 MiB).
pub const NATIVE_MAX_MESSAGE_LENGTH: usize = 64 << 20;

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Cast mDNS service type (note: trailing dot is required by mdns-sd).
pub const GOOGLECAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Default Cast control port.
pub const DEFAULT_CAST_PORT: u16 = 8009;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Version string returned for `bridge:getInfo`.
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");
