use bytes::{Buf, BufMut, BytesMut};
use prost::Message;
use tokio_util::codec::{Decoder, Encoder};

use super::error::CastCodecError;
use super::proto::CastMessage;
use crate::protocol_constants::{CAST_FRAME_HEADER_LENGTH, CAST_MAX_MESSAGE_LENGTH};

/// `CastCodec` decodes a length-prefixed protobuf. This enum represents the
/// phase of the decoding so the decoder never drops bytes from the `BytesMut`
/// between calls.
#[derive(Debug, Default)]
enum DecodeState {
    /// Waiting to read a u32 representing the size of the next protobuf.
    #[default]
    Header,
    /// Reading a protobuf with a given length.
    Payload(usize),
}

/// Cast wire protocol codec: a 4-byte big endian length followed by a
/// serialized [`CastMessage`].
#[derive(Debug, Default)]
pub struct CastCodec {
    state: DecodeState,
    decoded_frames: u64,
    encoded_frames: u64,
}

impl CastCodec {
    /// Cast wire protocol is a 4-byte big endian length-prefixed protobuf. At
    /// least 4 bytes are required to decode the next frame. Read the length of
    /// the following protobuf and reserve that much capacity in the `BytesMut`.
    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<usize>, CastCodecError> {
        if src.len() < CAST_FRAME_HEADER_LENGTH {
            return Ok(None);
        }
        let length = src.get_u32() as usize;
        if length > CAST_MAX_MESSAGE_LENGTH {
            return Err(CastCodecError::FrameTooLarge {
                length,
                max: CAST_MAX_MESSAGE_LENGTH,
            });
        }
        src.reserve(length);
        Ok(Some(length))
    }
}

impl Decoder for CastCodec {
    type Item = CastMessage;
    type Error = CastCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let n = match self.state {
            DecodeState::Header => match self.decode_header(src)? {
                Some(n) => n,
                None => return Ok(None),
            },
            DecodeState::Payload(n) => n,
        };
        self.state = DecodeState::Payload(n);

        if src.len() < n {
            return Ok(None);
        }
        let payload = src.split_to(n);
        self.state = DecodeState::Header;
        src.reserve(CAST_FRAME_HEADER_LENGTH);

        let message = CastMessage::decode(payload)?;
        self.decoded_frames += 1;
        log::trace!(
            "[CastCodec] Decoded frame {} on {} ({} -> {})",
            self.decoded_frames,
            message.namespace,
            message.source_id,
            message.destination_id
        );
        Ok(Some(message))
    }
}

impl Encoder<CastMessage> for CastCodec {
    type Error = CastCodecError;

    fn encode(&mut self, item: CastMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = item.encoded_len();
        if length > CAST_MAX_MESSAGE_LENGTH {
            return Err(CastCodecError::FrameTooLarge {
                length,
                max: CAST_MAX_MESSAGE_LENGTH,
            });
        }

        dst.reserve(CAST_FRAME_HEADER_LENGTH + length);
        dst.put_u32(length as u32);
        item.encode(dst)?;
        self.encoded_frames += 1;
        log::trace!(
            "[CastCodec] Encoded frame {} on {} ({} -> {})",
            self.encoded_frames,
            item.namespace,
            item.source_id,
            item.destination_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::HEARTBEAT_NAMESPACE;

    fn ping() -> CastMessage {
        CastMessage::text("sender-0", "receiver-0", HEARTBEAT_NAMESPACE, r#"{"type":"PING"}"#)
    }

    #[test]
    fn header_is_big_endian_length() {
        let mut codec = CastCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(ping(), &mut buf).unwrap();
        let length = ping().encoded_len() as u32;
        assert_eq!(&buf[..4], &length.to_be_bytes());
        assert_eq!(buf.len(), 4 + length as usize);
    }

    #[test]
    fn decodes_across_partial_reads() {
        let mut codec = CastCodec::default();
        let mut encoded = BytesMut::new();
        codec.encode(ping(), &mut encoded).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded[..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&encoded[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(ping()));
    }

    #[test]
    fn rejects_oversize_frames() {
        let mut codec = CastCodec::default();
        let mut buf = BytesMut::new();
        buf.put_u32((CAST_MAX_MESSAGE_LENGTH + 1) as u32);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CastCodecError::FrameTooLarge { .. }));

        let huge = CastMessage::text("a", "b", "ns", "x".repeat(CAST_MAX_MESSAGE_LENGTH));
        let err = codec.encode(huge, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, CastCodecError::FrameTooLarge { .. }));
    }
}
