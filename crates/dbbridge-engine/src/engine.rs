//! The `BackendEngine` trait, which every database adapter implements.
//!
//! The session component registers one remote procedure per method and
//! forwards each call here. Adapters never see the WAMP layer, only
//! their arguments and the caller metadata.

use std::future::Future;

use dbbridge_protocol::CallDetails;
use serde_json::Value;

use crate::{EngineError, EngineKind, WatchReply, WatchRequest};

/// Settings handed to an engine when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// The namespace root the session registers under. Watch topics
    /// are derived from it.
    pub topic_base: String,

    /// Log every statement at `info` instead of `debug`.
    pub debug: bool,
}

/// A database adapter.
///
/// # Concurrency
///
/// One engine instance serves every peer that calls into the session, and
/// the runtime dispatches each invocation as its own task. `query`,
/// `operation`, and `watch` can therefore run concurrently against the
/// same instance; implementations synchronize internally.
///
/// The futures are `Send` because invocations are spawned onto the Tokio
/// runtime.
pub trait BackendEngine: Send + Sync + 'static {
    /// Opens (or replaces) the backend connection described by `dsn`.
    ///
    /// # Errors
    /// [`EngineError::Connection`] when the DSN is invalid or unreachable.
    fn connect(
        &self,
        dsn: &str,
        details: &CallDetails,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Closes the backend connection. Idempotent.
    fn disconnect(
        &self,
        details: &CallDetails,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Runs a statement that returns rows.
    ///
    /// # Errors
    /// [`EngineError::Query`] on malformed statements or backend
    /// rejection, [`EngineError::NotConnected`] before `connect`.
    fn query(
        &self,
        statement: &str,
        params: &[Value],
        details: &CallDetails,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Runs a named operation (for the SQL adapter, a statement that
    /// modifies data).
    ///
    /// # Errors
    /// [`EngineError::Operation`] on backend rejection.
    fn operation(
        &self,
        name: &str,
        params: &[Value],
        details: &CallDetails,
    ) -> impl Future<Output = Result<Value, EngineError>> + Send;

    /// Starts or cancels a change watch.
    ///
    /// A started watch yields a [`WatchSubscription`](crate::WatchSubscription)
    /// whose event stream runs until cancelled, until the engine
    /// disconnects, or until the engine is dropped.
    fn watch(
        &self,
        request: WatchRequest,
        details: &CallDetails,
    ) -> impl Future<Output = Result<WatchReply, EngineError>> + Send;
}

/// Builds engine instances for resolved engine kinds.
///
/// The session asks the factory for a fresh engine on every join, so the
/// instance never outlives the session that created it.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: BackendEngine;

    /// Creates an engine of the given kind.
    ///
    /// # Errors
    /// Any error is fatal to the join that requested the instance.
    fn create(
        &self,
        kind: EngineKind,
        options: EngineOptions,
    ) -> Result<Self::Engine, EngineError>;
}
