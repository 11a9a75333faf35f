//! The contract between the session component and the WAMP runtime that
//! drives it.
//!
//! The runtime owns the wire. The component asks it to join, register,
//! call, unregister, and disconnect; each of those is a suspension point
//! that awaits a router round trip. Procedures handed to
//! [`SessionRuntime::register`] are plain closures returning boxed futures,
//! so the runtime can run every invocation as its own task.

use std::sync::Arc;

use dbbridge_engine::{EngineError, WatchSubscription};
use dbbridge_protocol::{Dict, Invocation, RegistrationId};
use futures_util::future::BoxFuture;
use serde_json::Value;

/// What a registered procedure hands back to the runtime.
#[derive(Debug)]
pub enum Reply {
    /// Returned to the caller as the single positional result.
    Value(Value),

    /// A started watch. The caller receives `{id, topic}`; the runtime
    /// publishes every event of the stream to `topic`.
    Subscription(WatchSubscription),
}

/// A call-scoped failure, returned to the calling peer as an ERROR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{uri}: {message}")]
pub struct CallError {
    pub uri: String,
    pub message: String,
}

impl CallError {
    pub fn new(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Maps an engine failure to `<topic_base>.error.<kind>`.
    pub fn from_engine(topic_base: &str, err: &EngineError) -> Self {
        Self::new(format!("{topic_base}.error.{}", err.kind()), err.to_string())
    }
}

pub type ProcedureFuture = BoxFuture<'static, Result<Reply, CallError>>;

/// A registered procedure's handler.
pub type Procedure = Arc<dyn Fn(Invocation) -> ProcedureFuture + Send + Sync>;

/// Failures reported by a [`SessionRuntime`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The session is not (or no longer) joined to a realm.
    #[error("session is not joined")]
    NotJoined,

    /// The underlying connection is gone.
    #[error("connection closed")]
    Closed,

    /// The router didn't answer in time.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The router or the callee answered with an ERROR.
    #[error("{uri}: {message}")]
    Remote { uri: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<CallError> for RuntimeError {
    fn from(err: CallError) -> Self {
        Self::Remote {
            uri: err.uri,
            message: err.message,
        }
    }
}

/// The session protocol engine, as seen by the session component.
///
/// Implementations are shared with their reader task, so every method
/// takes `&self`.
pub trait SessionRuntime: Send + Sync {
    /// Sends the join request for `realm`, offering `authmethods` for
    /// `authid`. Completes once the request is on the wire; the outcome
    /// arrives later as a challenge, a welcome, or an abort.
    async fn join(
        &self,
        realm: &str,
        authmethods: &[String],
        authid: &str,
    ) -> Result<(), RuntimeError>;

    /// Registers `procedure`, routing its invocations to `handler`.
    async fn register(
        &self,
        procedure: &str,
        handler: Procedure,
    ) -> Result<RegistrationId, RuntimeError>;

    /// Calls a procedure and waits for its single result.
    async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Dict,
    ) -> Result<Value, RuntimeError>;

    async fn unregister(&self, registration: RegistrationId) -> Result<(), RuntimeError>;

    /// Closes the transport. Idempotent.
    async fn disconnect(&self) -> Result<(), RuntimeError>;
}
