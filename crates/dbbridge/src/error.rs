//! Unified error type for dbbridge.

use dbbridge_engine::EngineError;
use dbbridge_protocol::{CloseDetails, ProtocolError};
use dbbridge_session::{RuntimeError, SessionError};
use dbbridge_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Connecting or talking to the router failed at the socket level.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lifecycle hook failed (config, auth, registration, eager connect).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A router request failed outside a lifecycle hook.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The router refused the session.
    #[error("session aborted by router: {0}")]
    Aborted(CloseDetails),
}
