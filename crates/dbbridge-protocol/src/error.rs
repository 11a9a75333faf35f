//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding WAMP messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not valid JSON, or not the expected shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message type code is not one this peer understands.
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),

    /// The message parsed as JSON but violates WAMP framing rules,
    /// e.g. a missing element or an element of the wrong type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
