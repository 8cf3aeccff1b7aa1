//! The `CastMessage` envelope from `cast_channel.proto`.
//!
//! Declared by hand with prost derives instead of generated by a build
//! script; the envelope is seven fields and has not changed since CASTV2_1_0.

use serde::Serialize;

/// Protocol version carried in every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtocolVersion {
    Castv210 = 0,
}

/// Which payload field of the envelope is populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    String = 0,
    Binary = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CastMessage {
    #[prost(enumeration = "ProtocolVersion", required, tag = "1")]
    pub protocol_version: i32,
    #[prost(string, required, tag = "2")]
    pub source_id: String,
    #[prost(string, required, tag = "3")]
    pub destination_id: String,
    #[prost(string, required, tag = "4")]
    pub namespace: String,
    #[prost(enumeration = "PayloadType", required, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload_binary: Option<Vec<u8>>,
}

impl CastMessage {
    /// Builds a string-payload envelope from already-serialized JSON text.
    pub fn text(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::Castv210 as i32,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload_type: PayloadType::String as i32,
            payload_utf8: Some(payload.into()),
            payload_binary: None,
        }
    }

    /// Builds a string-payload envelope by serializing `payload` to JSON.
    pub fn json<T: Serialize + ?Sized>(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let text = serde_json::to_string(payload)?;
        Ok(Self::text(source_id, destination_id, namespace, text))
    }

    /// Returns the UTF-8 payload when this is a string envelope.
    #[must_use]
    pub fn text_payload(&self) -> Option<&str> {
        if self.payload_type != PayloadType::String as i32 {
            return None;
        }
        self.payload_utf8.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use serde_json::json;

    #[test]
    fn required_defaults_are_still_encoded() {
        let msg = CastMessage::text("sender-0", "receiver-0", "ns", "");
        let bytes = msg.encode_to_vec();
        // Field 1 (varint) with value 0 must be present for receivers to accept the envelope.
        assert_eq!(&bytes[..2], &[0x08, 0x00]);
        let decoded = CastMessage::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn binary_envelope_has_no_text_payload() {
        let mut msg = CastMessage::json("a", "b", "ns", &json!({"type": "PING"})).unwrap();
        assert_eq!(msg.text_payload(), Some(r#"{"type":"PING"}"#));
        msg.payload_type = PayloadType::Binary as i32;
        assert_eq!(msg.text_payload(), None);
    }
}
