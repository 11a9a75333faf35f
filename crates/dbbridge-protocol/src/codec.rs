//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The runtime doesn't care how messages become bytes, it only needs a
//! [`Codec`]. [`JsonCodec`] matches the `wamp.2.json` subprotocol.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
pub trait Codec: Send + Sync + 'static {
    /// The WebSocket subprotocol this codec implements.
    fn subprotocol(&self) -> &'static str;

    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use dbbridge_protocol::{Codec, JsonCodec, Message, RequestId, Dict};
///
/// let codec = JsonCodec;
/// let msg = Message::Register {
///     request: RequestId(1),
///     options: Dict::new(),
///     procedure: "com.db.query".into(),
/// };
///
/// let bytes = codec.encode(&msg).unwrap();
/// assert_eq!(bytes, br#"[64,1,{},"com.db.query"]"#);
///
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn subprotocol(&self) -> &'static str {
        "wamp.2.json"
    }

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
