//! Length-prefixed JSON framing for the extension channel.
//!
//! Every frame is a 4-byte little-endian unsigned length followed by exactly
//! that many bytes of UTF-8 JSON. This is the browser native messaging wire
//! format; the same framing is reused by the WebSocket daemon's tests.
//!
//! The decoder yields `Result<Value, serde_json::Error>` items so a frame with
//! malformed JSON is reported and skipped without tearing down the stream.
//! Only I/O failures and oversize frames are fatal.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol_constants::{NATIVE_FRAME_HEADER_LENGTH, NATIVE_MAX_MESSAGE_LENGTH};

/// Errors that end a framed stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {length} bytes exceeds the maximum of {max} bytes")]
    TooLarge { length: usize, max: usize },

    #[error("failed to serialize frame payload: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Payload(usize),
}

/// Codec for 4-byte little-endian length-prefixed JSON frames.
#[derive(Debug)]
pub struct JsonFrameCodec {
    state: DecodeState,
    max_length: usize,
}

impl JsonFrameCodec {
    /// Creates a codec that rejects inbound frames larger than `max_length`.
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_length,
        }
    }

    /// Maximum accepted payload length in bytes.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new(NATIVE_MAX_MESSAGE_LENGTH)
    }
}

/// A zero-length frame decodes as an empty object.
fn parse_payload(payload: &[u8]) -> Result<Value, serde_json::Error> {
    if payload.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(payload)
}

impl Decoder for JsonFrameCodec {
    type Item = Result<Value, serde_json::Error>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let length = match self.state {
            DecodeState::Header => {
                if src.len() < NATIVE_FRAME_HEADER_LENGTH {
                    return Ok(None);
                }
                let length = src.get_u32_le() as usize;
                if length > self.max_length {
                    return Err(FrameError::TooLarge {
                        length,
                        max: self.max_length,
                    });
                }
                src.reserve(length);
                self.state = DecodeState::Payload(length);
                length
            }
            DecodeState::Payload(length) => length,
        };

        if src.len() < length {
            return Ok(None);
        }

        let payload = src.split_to(length);
        self.state = DecodeState::Header;
        log::trace!("[Framing] Decoded frame: {} bytes", length);
        Ok(Some(parse_payload(&payload)))
    }
}

impl<T: Serialize> Encoder<T> for JsonFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item).map_err(FrameError::Serialize)?;
        let length = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
            length: payload.len(),
            max: u32::MAX as usize,
        })?;
        dst.reserve(NATIVE_FRAME_HEADER_LENGTH + payload.len());
        dst.put_u32_le(length);
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Encodes a single value as a complete frame.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    let mut buf = BytesMut::new();
    JsonFrameCodec::default().encode(value, &mut buf)?;
    Ok(buf.to_vec())
}
