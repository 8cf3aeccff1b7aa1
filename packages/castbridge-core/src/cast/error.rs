use std::io;

use thiserror::Error;

/// Errors raised while encoding or decoding Cast frames.
#[derive(Debug, Error)]
pub enum CastCodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cast frame of {length} bytes exceeds the maximum of {max} bytes")]
    FrameTooLarge { length: usize, max: usize },

    #[error("failed to decode cast message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode cast message: {0}")]
    Encode(#[from] prost::EncodeError),
}

impl CastCodecError {
    /// `true` when the peer hung up rather than the stream failing.
    pub fn is_peer_closed(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            )
        )
    }
}

/// Errors raised by a [`CastTransport`](super::CastTransport) and its channels.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {host}:{port}")]
    Timeout { host: String, port: u16 },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("transport is {0}")]
    InvalidState(&'static str),

    #[error("transport closed")]
    Closed,

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CastCodecError),
}

pub type TransportResult<T> = Result<T, TransportError>;
