//! Error types for the session layer.

use dbbridge_engine::EngineError;

use crate::{RuntimeError, SessionState};

/// Errors raised by the session component's lifecycle hooks.
///
/// All of these are join-scoped or handshake-scoped: when one is returned
/// the session does not reach (or does not stay in) the joined state.
/// Backend failures during a forwarded call never show up here; they go
/// back to the calling peer as a [`CallError`](crate::CallError).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The configuration is incomplete or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The engine identifier is not in the alias table.
    #[error("unsupported engine {0:?}")]
    UnsupportedEngine(String),

    /// The router challenged with a method we cannot answer.
    #[error("authentication method {0:?} is not supported")]
    AuthMethodUnsupported(String),

    /// A `wampcra` challenge without a nonce, or with malformed
    /// derivation parameters.
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// Registering one of the five procedures failed. Registrations made
    /// before it have been rolled back.
    #[error("failed to register {procedure}: {source}")]
    Registration {
        procedure: String,
        #[source]
        source: RuntimeError,
    },

    /// The configured DSN was set, but calling `connect` with it failed.
    #[error("connect with configured DSN failed: {0}")]
    EagerConnect(#[source] RuntimeError),

    /// The engine factory refused to build an engine.
    #[error("engine instantiation failed: {0}")]
    Engine(#[from] EngineError),

    /// The runtime failed a request outside registration.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A hook was invoked in a state that doesn't allow it.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}
