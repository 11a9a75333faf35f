//! `DbSession`: the session component that attaches a database engine to a
//! WAMP realm.
//!
//! The runtime calls the lifecycle hooks in order:
//!
//! ```text
//! on_connect ─→ [on_challenge] ─→ on_join ─→ (serve calls) ─→ on_leave ─→ on_disconnect
//! ```
//!
//! Joining is all-or-nothing. The engine is resolved and built, all five
//! procedures are registered, and the configured DSN (if any) is connected
//! through the freshly registered `connect` procedure. If any step fails,
//! registrations made so far are undone and the engine is dropped.

use std::fmt;
use std::sync::Arc;

use dbbridge_engine::{
    BackendEngine, EngineError, EngineFactory, EngineKind, EngineOptions,
    WatchReply, WatchRequest,
};
use dbbridge_protocol::{
    CloseDetails, Dict, Invocation, RegistrationId, SessionDetails,
};
use futures_util::FutureExt;
use serde_json::{Value, json};

use crate::auth::{self, AuthChallenge};
use crate::{
    CallError, DbProcedure, Procedure, RegistrationSet, Reply, RuntimeError,
    SessionConfig, SessionError, SessionRuntime, SessionState,
};

/// Auth method offered when the configuration carries no auth info.
pub const ANONYMOUS: &str = "anonymous";

/// `authid` offered when the configuration carries no auth info.
pub const ANONYMOUS_USER: &str = "anon";

/// Secret used to answer a challenge when none is configured.
const DEFAULT_PASSWORD: &str = "unknown";

type DisconnectHook = Box<dyn FnMut() + Send>;

/// The engine and registrations of a joined session. They live and die
/// together.
struct Attachment<E> {
    kind: EngineKind,
    engine: Arc<E>,
    registrations: RegistrationSet,
}

/// What went wrong during teardown. Teardown itself always completes.
#[derive(Debug, Default)]
pub struct LeaveReport {
    /// Unregister calls that failed, in the order they were attempted.
    pub unregister_failures: Vec<(DbProcedure, RuntimeError)>,
    pub disconnect_failure: Option<RuntimeError>,
}

impl LeaveReport {
    pub fn is_clean(&self) -> bool {
        self.unregister_failures.is_empty() && self.disconnect_failure.is_none()
    }
}

/// The database session component.
///
/// Generic over the [`EngineFactory`] so tests can substitute a recording
/// engine. A fresh engine is built on every join and released on leave.
pub struct DbSession<F: EngineFactory> {
    config: SessionConfig,
    factory: F,
    state: SessionState,
    attachment: Option<Attachment<F::Engine>>,
    on_disconnect: Option<DisconnectHook>,
}

impl<F: EngineFactory> fmt::Debug for DbSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("engine", &self.engine_kind())
            .finish_non_exhaustive()
    }
}

impl<F: EngineFactory> DbSession<F> {
    pub fn new(config: SessionConfig, factory: F) -> Self {
        Self {
            config,
            factory,
            state: SessionState::Disconnected,
            attachment: None,
            on_disconnect: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The live registrations. `Some` exactly while joined.
    pub fn registrations(&self) -> Option<&RegistrationSet> {
        self.attachment.as_ref().map(|a| &a.registrations)
    }

    /// The kind of the attached engine, while joined.
    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.attachment.as_ref().map(|a| a.kind)
    }

    /// Installs the callback run from [`on_disconnect`](Self::on_disconnect).
    ///
    /// The host decides what a closed transport means: the launcher stops,
    /// an embedding application might reconnect.
    pub fn set_on_disconnect(&mut self, hook: impl FnMut() + Send + 'static) {
        self.on_disconnect = Some(Box::new(hook));
    }

    // -----------------------------------------------------------------------
    // Lifecycle hooks
    // -----------------------------------------------------------------------

    /// The transport is open: ask the runtime to join the realm.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] unless disconnected, or
    /// [`SessionError::Runtime`] if the join request could not be sent.
    pub async fn on_connect<R: SessionRuntime>(
        &mut self,
        runtime: &R,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }
        self.state = SessionState::Connecting;

        let (method, user) = match self.config.authinfo() {
            Some(auth) => (auth.auth_type.as_str(), auth.auth_user.as_str()),
            None => (ANONYMOUS, ANONYMOUS_USER),
        };
        let realm = self.config.realm();
        tracing::info!(realm, authmethod = method, authid = user, "joining realm");

        if let Err(e) = runtime.join(realm, &[method.to_string()], user).await {
            self.state = SessionState::Disconnected;
            return Err(e.into());
        }
        self.state = SessionState::Authenticating;
        Ok(())
    }

    /// Answers an authentication challenge.
    ///
    /// # Errors
    /// [`SessionError::AuthMethodUnsupported`] for methods other than
    /// `wampcra`, which must abort the handshake.
    pub fn on_challenge(
        &mut self,
        challenge: &AuthChallenge,
    ) -> Result<String, SessionError> {
        if self.state != SessionState::Authenticating {
            return Err(SessionError::InvalidState {
                operation: "answer a challenge",
                state: self.state,
            });
        }
        tracing::debug!(
            method = %challenge.method,
            salted = challenge.salt.is_some(),
            "answering challenge"
        );
        let secret = self
            .config
            .authinfo()
            .map_or(DEFAULT_PASSWORD, |auth| auth.auth_password.as_str());
        auth::sign(secret, challenge)
    }

    /// The router welcomed us: attach the engine and register the
    /// procedures.
    ///
    /// # Errors
    /// - [`SessionError::Config`] without an engine identifier or topic base
    /// - [`SessionError::UnsupportedEngine`] for an unknown identifier
    /// - [`SessionError::Engine`] if the factory fails
    /// - [`SessionError::Registration`] if any registration fails
    /// - [`SessionError::EagerConnect`] if connecting the configured DSN fails
    ///
    /// On error nothing stays registered and no engine is retained.
    pub async fn on_join<R: SessionRuntime>(
        &mut self,
        runtime: &R,
        details: &SessionDetails,
    ) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Joined | SessionState::Leaving) {
            return Err(SessionError::InvalidState {
                operation: "join",
                state: self.state,
            });
        }

        let identifier = self.config.engine().ok_or_else(|| {
            SessionError::Config("an engine identifier is required to join".into())
        })?;
        let topic_base = self.config.topic_base().ok_or_else(|| {
            SessionError::Config("a topic base is required to join".into())
        })?;

        let kind = EngineKind::resolve(identifier)
            .map_err(|_| SessionError::UnsupportedEngine(identifier.to_string()))?;
        let engine = Arc::new(self.factory.create(
            kind,
            EngineOptions {
                topic_base: topic_base.to_string(),
                debug: self.config.debug(),
            },
        )?);
        tracing::debug!(engine = %kind, identifier, "engine created");

        let registrations = register_all(runtime, &engine, topic_base).await?;

        if let Some(dsn) = self.config.dsn() {
            let uri = DbProcedure::Connect.uri(topic_base);
            tracing::info!(procedure = %uri, "connecting backend to configured DSN");
            if let Err(e) = runtime.call(&uri, vec![Value::from(dsn)], Dict::new()).await {
                tracing::error!(procedure = %uri, error = %e, "connect with configured DSN failed");
                rollback(runtime, registrations.iter()).await;
                return Err(SessionError::EagerConnect(e));
            }
        }

        tracing::info!(
            realm = %details.realm,
            session = ?details.session,
            authrole = ?details.authrole,
            engine = %kind,
            topic_base,
            "session joined"
        );
        self.attachment = Some(Attachment {
            kind,
            engine,
            registrations,
        });
        self.state = SessionState::Joined;
        Ok(())
    }

    /// The session is ending: unregister everything, release the engine,
    /// and close the transport.
    ///
    /// Every step is attempted even when an earlier one fails; the
    /// failures are logged and returned in the report. An unregister
    /// refused with [`RuntimeError::NotJoined`] is not a failure: the
    /// router already ended the session.
    pub async fn on_leave<R: SessionRuntime>(
        &mut self,
        runtime: &R,
        details: &CloseDetails,
    ) -> LeaveReport {
        self.state = SessionState::Leaving;
        tracing::info!(%details, "leaving realm");

        let mut report = LeaveReport::default();
        if let Some(Attachment {
            kind,
            engine,
            registrations,
        }) = self.attachment.take()
        {
            for (procedure, id) in registrations.iter() {
                match runtime.unregister(id).await {
                    Ok(()) => tracing::debug!(%procedure, registration = %id, "unregistered"),
                    // The router ended the session and dropped its
                    // registrations along with it.
                    Err(RuntimeError::NotJoined) => {
                        tracing::debug!(%procedure, registration = %id, "already unregistered by router");
                    }
                    Err(e) => {
                        tracing::warn!(%procedure, registration = %id, error = %e, "unregister failed");
                        report.unregister_failures.push((procedure, e));
                    }
                }
            }
            drop(engine);
            tracing::debug!(engine = %kind, "engine released");
        }

        if let Err(e) = runtime.disconnect().await {
            tracing::warn!(error = %e, "disconnect failed");
            report.disconnect_failure = Some(e);
        }
        report
    }

    /// The transport is closed. Runs the host's callback, if any.
    pub fn on_disconnect(&mut self) {
        if self.attachment.take().is_some() {
            tracing::warn!("transport closed while joined; registrations abandoned");
        }
        self.state = SessionState::Disconnected;
        tracing::info!("session disconnected");
        if let Some(hook) = self.on_disconnect.as_mut() {
            hook();
        }
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

async fn register_all<R: SessionRuntime, E: BackendEngine>(
    runtime: &R,
    engine: &Arc<E>,
    topic_base: &str,
) -> Result<RegistrationSet, SessionError> {
    let base: Arc<str> = Arc::from(topic_base);
    let mut made: Vec<(DbProcedure, RegistrationId)> = Vec::with_capacity(DbProcedure::ALL.len());

    for procedure in DbProcedure::ALL {
        let uri = procedure.uri(topic_base);
        let handler = forwarder(procedure, Arc::clone(engine), Arc::clone(&base));
        match runtime.register(&uri, handler).await {
            Ok(id) => {
                tracing::debug!(procedure = %uri, registration = %id, "registered");
                made.push((procedure, id));
            }
            Err(source) => {
                tracing::error!(procedure = %uri, error = %source, "registration failed; rolling back");
                rollback(runtime, made.iter().copied()).await;
                return Err(SessionError::Registration {
                    procedure: uri,
                    source,
                });
            }
        }
    }

    RegistrationSet::from_ordered(&made).ok_or_else(|| SessionError::Registration {
        procedure: topic_base.to_string(),
        source: RuntimeError::Protocol("incomplete registration set".into()),
    })
}

/// Best-effort undo of a partial join.
async fn rollback<R: SessionRuntime>(
    runtime: &R,
    made: impl IntoIterator<Item = (DbProcedure, RegistrationId)>,
) {
    for (procedure, id) in made {
        if let Err(e) = runtime.unregister(id).await {
            tracing::warn!(%procedure, registration = %id, error = %e, "rollback unregister failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

/// Builds the handler registered for `procedure`.
fn forwarder<E: BackendEngine>(
    procedure: DbProcedure,
    engine: Arc<E>,
    topic_base: Arc<str>,
) -> Procedure {
    Arc::new(move |invocation: Invocation| {
        let engine = Arc::clone(&engine);
        let topic_base = Arc::clone(&topic_base);
        async move {
            dispatch(procedure, engine.as_ref(), invocation)
                .await
                .map_err(|e| CallError::from_engine(&topic_base, &e))
        }
        .boxed()
    })
}

/// Invocation arguments, by procedure:
///
/// | procedure | positional | keyword |
/// |---|---|---|
/// | connect | `[dsn]` | `dsn` |
/// | disconnect | none | none |
/// | query | `[statement, params?]` | `statement`, `params` |
/// | operation | `[name, params?]` | `name`, `params` |
/// | watch | `[request]` | `request`, or the request's own fields |
async fn dispatch<E: BackendEngine>(
    procedure: DbProcedure,
    engine: &E,
    invocation: Invocation,
) -> Result<Reply, EngineError> {
    let details = &invocation.details;
    match procedure {
        DbProcedure::Connect => {
            let dsn = string_param(&invocation, 0, "dsn")?;
            engine.connect(dsn, details).await.map(Reply::Value)
        }
        DbProcedure::Disconnect => engine.disconnect(details).await.map(Reply::Value),
        DbProcedure::Query => {
            let statement = string_param(&invocation, 0, "statement")?;
            let params = params_param(&invocation, 1)?;
            engine.query(statement, &params, details).await.map(Reply::Value)
        }
        DbProcedure::Operation => {
            let name = string_param(&invocation, 0, "name")?;
            let params = params_param(&invocation, 1)?;
            engine.operation(name, &params, details).await.map(Reply::Value)
        }
        DbProcedure::Watch => {
            let request = watch_request(&invocation)?;
            match engine.watch(request, details).await? {
                WatchReply::Started(subscription) => Ok(Reply::Subscription(subscription)),
                WatchReply::Cancelled { id } => Ok(Reply::Value(json!({"cancelled": id}))),
            }
        }
    }
}

fn string_param<'a>(
    invocation: &'a Invocation,
    position: usize,
    keyword: &str,
) -> Result<&'a str, EngineError> {
    match invocation.param(position, keyword) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EngineError::InvalidArgument(format!(
            "{keyword} must be a string, got {other}"
        ))),
        None => Err(EngineError::InvalidArgument(format!("missing {keyword}"))),
    }
}

fn params_param(invocation: &Invocation, position: usize) -> Result<Vec<Value>, EngineError> {
    match invocation.param(position, "params") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(EngineError::InvalidArgument(format!(
            "params must be an array, got {other}"
        ))),
    }
}

fn watch_request(invocation: &Invocation) -> Result<WatchRequest, EngineError> {
    let request = match invocation.param(0, "request") {
        Some(request) => request.clone(),
        None if !invocation.kwargs.is_empty() => Value::Object(invocation.kwargs.clone()),
        None => return Err(EngineError::InvalidArgument("missing watch request".into())),
    };
    serde_json::from_value(request)
        .map_err(|e| EngineError::InvalidArgument(format!("malformed watch request: {e}")))
}
