//! `ApplicationRunner`: connects a [`DbSession`] to a router and drives
//! its lifecycle hooks until the session ends.
//!
//! This is the entry point for running dbbridge. It ties together all the
//! layers: transport → protocol → session → engine.

use std::future::Future;
use std::time::Duration;

use dbbridge_engine::EngineFactory;
use dbbridge_protocol::{CloseDetails, SessionDetails};
use dbbridge_session::{
    AuthChallenge, DbSession, SessionRuntime, SessionState,
};

use crate::{BridgeError, ClientOptions, SessionEvent, WampClient};

/// Default router endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";

const AUTH_FAILED: &str = "wamp.error.authentication_failed";

/// Runs one session against one router.
///
/// # Example
///
/// ```rust,no_run
/// use dbbridge::prelude::*;
///
/// # async fn run() -> Result<(), BridgeError> {
/// let config = SessionConfig::builder()
///     .engine("SQLITE")
///     .topic_base("com.db")
///     .dsn("sqlite::memory:")
///     .build()?;
/// let mut session = DbSession::new(config, SqlEngineFactory);
///
/// ApplicationRunner::new("ws://127.0.0.1:8080/ws")
///     .run(&mut session, async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApplicationRunner {
    url: String,
    options: ClientOptions,
}

impl ApplicationRunner {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: ClientOptions::default(),
        }
    }

    /// How long each router request may take. Default: 10 seconds.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// How long to wait for the router to answer our GOODBYE.
    /// Default: 2 seconds.
    pub fn goodbye_timeout(mut self, timeout: Duration) -> Self {
        self.options.goodbye_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connects, joins, and serves until the router ends the session, the
    /// transport drops, or `shutdown` completes.
    ///
    /// The session's `on_disconnect` hook runs before this returns,
    /// whatever the outcome.
    ///
    /// # Errors
    /// Connection failures, a router ABORT, and any join-scoped
    /// [`SessionError`](dbbridge_session::SessionError). On a join error
    /// the session is torn down and the error returned; nothing is
    /// retried.
    pub async fn run<F: EngineFactory>(
        &self,
        session: &mut DbSession<F>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<CloseDetails, BridgeError> {
        let (client, mut events) = WampClient::connect(&self.url, self.options).await?;

        let outcome = match session.on_connect(&client).await {
            Ok(()) => serve(&client, session, &mut events, shutdown).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = client.disconnect().await {
            tracing::debug!(error = %e, "disconnect after session end failed");
        }
        session.on_disconnect();

        match &outcome {
            Ok(close) => tracing::info!(%close, "session ended"),
            Err(e) => tracing::error!(error = %e, "session failed"),
        }
        outcome
    }
}

async fn serve<F: EngineFactory>(
    client: &WampClient,
    session: &mut DbSession<F>,
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: impl Future<Output = ()>,
) -> Result<CloseDetails, BridgeError> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Challenge { method, extra }) => {
                    let answer = AuthChallenge::from_extra(&method, &extra)
                        .and_then(|challenge| session.on_challenge(&challenge));
                    match answer {
                        Ok(signature) => client.authenticate(signature).await?,
                        Err(e) => {
                            if let Err(abort) = client.abort(AUTH_FAILED, &e.to_string()).await {
                                tracing::debug!(error = %abort, "failed to send ABORT");
                            }
                            return Err(e.into());
                        }
                    }
                }
                Some(SessionEvent::Welcome { session: id, details }) => {
                    let details = SessionDetails::from_welcome(session.config().realm(), id, &details);
                    tracing::info!(%details, "welcomed by router");
                    session.on_join(client, &details).await?;
                }
                Some(SessionEvent::Abort(close)) => {
                    return Err(BridgeError::Aborted(close));
                }
                Some(SessionEvent::Goodbye(close)) => {
                    leave(client, session, &close).await;
                    return Ok(close);
                }
                Some(SessionEvent::Closed) | None => {
                    return Ok(CloseDetails::new("wamp.close.transport_lost"));
                }
            },
            () = &mut shutdown => {
                let close = CloseDetails::new("wamp.close.system_shutdown");
                if session.state() == SessionState::Joined {
                    leave(client, session, &close).await;
                }
                return Ok(close);
            }
        }
    }
}

async fn leave<F: EngineFactory>(
    client: &WampClient,
    session: &mut DbSession<F>,
    close: &CloseDetails,
) {
    let report = session.on_leave(client, close).await;
    if !report.is_clean() {
        tracing::warn!(
            unregister_failures = report.unregister_failures.len(),
            disconnect_failed = report.disconnect_failure.is_some(),
            "teardown completed with failures"
        );
    }
}

