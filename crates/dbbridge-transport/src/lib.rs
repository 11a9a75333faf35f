//! Transport abstraction layer for dbbridge.
//!
//! Provides the [`Connection`] trait that the WAMP runtime speaks through,
//! plus a WebSocket client implementation.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket client via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// How outgoing payloads are framed on the wire.
///
/// WAMP's JSON serialization travels in text frames, its binary
/// serializations in binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    Text,
    Binary,
}

impl Framing {
    /// Picks the framing mandated by a WAMP subprotocol name.
    pub fn for_subprotocol(subprotocol: &str) -> Self {
        if subprotocol.ends_with(".json") {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// A single connection that can send and receive bytes.
///
/// Sending and receiving must be usable concurrently from different
/// tasks: the runtime keeps one task parked in [`recv`](Self::recv)
/// for the whole life of the session.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends data to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
