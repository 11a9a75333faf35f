//! `WampClient`: a WAMP caller/callee/publisher over one WebSocket.
//!
//! The client is cheap to clone; every clone shares one connection and one
//! table of in-flight requests. A reader task (see [`handler`](crate::handler))
//! owns the receive side and resolves requests as replies arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dbbridge_engine::WatchSubscription;
use dbbridge_protocol::{
    Codec, Dict, JsonCodec, Message, RegistrationId, RequestId,
};
use dbbridge_session::{Procedure, RuntimeError, SessionRuntime};
use dbbridge_transport::{Connection, WebSocketConnection};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::BridgeError;
use crate::handler::{SessionEvent, run_reader};

/// Reason sent with our own GOODBYE.
const SHUTDOWN_REASON: &str = "wamp.close.system_shutdown";

/// Timeouts for a [`WampClient`].
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// How long a register/unregister/call waits for the router's reply.
    pub request_timeout: Duration,
    /// How long [`disconnect`](SessionRuntime::disconnect) waits for the
    /// router to answer our GOODBYE.
    pub goodbye_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            goodbye_timeout: Duration::from_secs(2),
        }
    }
}

/// A request waiting for its reply.
pub(crate) struct Pending {
    pub(crate) reply: oneshot::Sender<Message>,
    /// Installed by the reader when REGISTERED arrives, so no INVOCATION
    /// can race ahead of its handler.
    pub(crate) install: Option<Procedure>,
}

pub(crate) struct ClientInner {
    conn: WebSocketConnection,
    codec: JsonCodec,
    options: ClientOptions,
    next_request: AtomicU64,
    pub(crate) pending: Mutex<HashMap<RequestId, Pending>>,
    pub(crate) procedures: Mutex<HashMap<RegistrationId, Procedure>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    /// Set on WELCOME, cleared once either side says GOODBYE.
    pub(crate) joined: AtomicBool,
    /// Set once the transport is gone or being closed.
    pub(crate) closed: AtomicBool,
    /// Set once a GOODBYE has gone out, whichever side started.
    pub(crate) goodbye_sent: AtomicBool,
    pub(crate) goodbye_reply: Notify,
}

/// A connected WAMP client.
#[derive(Clone)]
pub struct WampClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl WampClient {
    /// Opens a WebSocket to `url` and starts the reader task.
    ///
    /// Session-level traffic (challenges, welcome, abort, goodbye, close)
    /// is delivered on the returned channel.
    pub async fn connect(
        url: &str,
        options: ClientOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), BridgeError> {
        let codec = JsonCodec;
        let conn = WebSocketConnection::connect(url, codec.subprotocol()).await?;
        tracing::info!(url, conn_id = %conn.id(), "connected to router");

        let client = Self {
            inner: Arc::new(ClientInner {
                conn,
                codec,
                options,
                next_request: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                procedures: Mutex::new(HashMap::new()),
                pumps: Mutex::new(Vec::new()),
                joined: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                goodbye_sent: AtomicBool::new(false),
                goodbye_reply: Notify::new(),
            }),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_reader(client.clone(), events_tx));
        Ok((client, events_rx))
    }

    pub fn is_joined(&self) -> bool {
        self.inner.joined.load(Ordering::SeqCst) && !self.inner.closed.load(Ordering::SeqCst)
    }

    /// Answers a CHALLENGE.
    pub async fn authenticate(&self, signature: String) -> Result<(), RuntimeError> {
        self.send(&Message::Authenticate {
            signature,
            extra: Dict::new(),
        })
        .await
    }

    /// Aborts the handshake and closes the transport.
    pub async fn abort(&self, reason: &str, message: &str) -> Result<(), RuntimeError> {
        let mut details = Dict::new();
        details.insert("message".into(), Value::from(message));
        self.send(&Message::Abort {
            details,
            reason: reason.to_string(),
        })
        .await?;
        self.close_transport().await
    }

    /// Publishes `args` to `topic` without asking for acknowledgement.
    pub async fn publish(&self, topic: &str, args: Vec<Value>) -> Result<(), RuntimeError> {
        if !self.is_joined() {
            return Err(RuntimeError::NotJoined);
        }
        let request = self.next_request();
        self.send(&Message::Publish {
            request,
            options: Dict::new(),
            topic: topic.to_string(),
            args,
            kwargs: Dict::new(),
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Plumbing shared with the reader
    // -----------------------------------------------------------------------

    pub(crate) async fn send(&self, message: &Message) -> Result<(), RuntimeError> {
        let bytes = self
            .inner
            .codec
            .encode(message)
            .map_err(|e| RuntimeError::Protocol(e.to_string()))?;
        tracing::trace!(code = message.type_code(), "sending");
        self.inner
            .conn
            .send(&bytes)
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Result<Message, RuntimeError> {
        self.inner
            .codec
            .decode(bytes)
            .map_err(|e| RuntimeError::Protocol(e.to_string()))
    }

    pub(crate) async fn recv(&self) -> Result<Option<Vec<u8>>, RuntimeError> {
        self.inner
            .conn
            .recv()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))
    }

    /// Publishes every event of a started watch until the stream ends or
    /// the client disconnects.
    pub(crate) async fn spawn_pump(&self, subscription: WatchSubscription) {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let WatchSubscription {
                id,
                topic,
                mut events,
            } = subscription;
            tracing::debug!(%id, %topic, "watch pump started");
            while let Some(event) = events.next().await {
                if let Err(e) = client.publish(&topic, vec![event]).await {
                    tracing::debug!(%id, error = %e, "watch pump stopping");
                    break;
                }
            }
            tracing::debug!(%id, "watch pump finished");
        });
        let mut pumps = self.inner.pumps.lock().await;
        pumps.retain(|h| !h.is_finished());
        pumps.push(handle);
    }

    pub(crate) async fn abort_pumps(&self) {
        for handle in self.inner.pumps.lock().await.drain(..) {
            handle.abort();
        }
    }

    /// Drops every installed procedure, and with them the engine they
    /// forward to. Registrations the router never acknowledged removing
    /// are abandoned here.
    pub(crate) async fn drop_procedures(&self) {
        let dropped = self.inner.procedures.lock().await.drain().count();
        if dropped > 0 {
            tracing::debug!(dropped, "released procedures");
        }
    }

    /// Fails every in-flight request; their senders are dropped.
    pub(crate) async fn fail_pending(&self) {
        let dropped = self.inner.pending.lock().await.drain().count();
        if dropped > 0 {
            tracing::debug!(dropped, "failed in-flight requests");
        }
    }

    fn next_request(&self) -> RequestId {
        RequestId(self.inner.next_request.fetch_add(1, Ordering::Relaxed))
    }

    async fn close_transport(&self) -> Result<(), RuntimeError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.abort_pumps().await;
        self.drop_procedures().await;
        self.fail_pending().await;
        self.inner
            .conn
            .close()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))
    }

    /// Sends a request and waits for the router's reply to it.
    async fn request(
        &self,
        what: &str,
        build: impl FnOnce(RequestId) -> Message,
        install: Option<Procedure>,
    ) -> Result<Message, RuntimeError> {
        if !self.is_joined() {
            return Err(RuntimeError::NotJoined);
        }
        let request = self.next_request();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .await
            .insert(request, Pending { reply: tx, install });

        if let Err(e) = self.send(&build(request)).await {
            self.inner.pending.lock().await.remove(&request);
            return Err(e);
        }

        match tokio::time::timeout(self.inner.options.request_timeout, rx).await {
            Ok(Ok(Message::Error { error, args, .. })) => Err(RuntimeError::Remote {
                message: args
                    .first()
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                uri: error,
            }),
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RuntimeError::Closed),
            Err(_) => {
                self.inner.pending.lock().await.remove(&request);
                Err(RuntimeError::Timeout(format!("{what} ({request})")))
            }
        }
    }
}

impl SessionRuntime for WampClient {
    async fn join(
        &self,
        realm: &str,
        authmethods: &[String],
        authid: &str,
    ) -> Result<(), RuntimeError> {
        let details = json!({
            "roles": {"caller": {}, "callee": {}, "publisher": {}},
            "authmethods": authmethods,
            "authid": authid,
        });
        let Value::Object(details) = details else {
            return Err(RuntimeError::Protocol("HELLO details must be an object".into()));
        };
        self.send(&Message::Hello {
            realm: realm.to_string(),
            details,
        })
        .await
    }

    async fn register(
        &self,
        procedure: &str,
        handler: Procedure,
    ) -> Result<RegistrationId, RuntimeError> {
        let mut options = Dict::new();
        options.insert("disclose_caller".into(), Value::Bool(true));
        let reply = self
            .request(
                procedure,
                |request| Message::Register {
                    request,
                    options,
                    procedure: procedure.to_string(),
                },
                Some(handler),
            )
            .await?;
        match reply {
            Message::Registered { registration, .. } => {
                tracing::debug!(procedure, %registration, "procedure registered");
                Ok(registration)
            }
            other => Err(unexpected("REGISTERED", &other)),
        }
    }

    async fn call(
        &self,
        procedure: &str,
        args: Vec<Value>,
        kwargs: Dict,
    ) -> Result<Value, RuntimeError> {
        let reply = self
            .request(
                procedure,
                |request| Message::Call {
                    request,
                    options: Dict::new(),
                    procedure: procedure.to_string(),
                    args,
                    kwargs,
                },
                None,
            )
            .await?;
        match reply {
            Message::Result { args, kwargs, .. } => Ok(match args.into_iter().next() {
                Some(value) => value,
                None if !kwargs.is_empty() => Value::Object(kwargs),
                None => Value::Null,
            }),
            other => Err(unexpected("RESULT", &other)),
        }
    }

    async fn unregister(&self, registration: RegistrationId) -> Result<(), RuntimeError> {
        let reply = self
            .request(
                "unregister",
                |request| Message::Unregister {
                    request,
                    registration,
                },
                None,
            )
            .await?;
        match reply {
            Message::Unregistered { .. } => {
                self.inner.procedures.lock().await.remove(&registration);
                Ok(())
            }
            other => Err(unexpected("UNREGISTERED", &other)),
        }
    }

    async fn disconnect(&self) -> Result<(), RuntimeError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let was_joined = self.inner.joined.swap(false, Ordering::SeqCst);
        if was_joined && !self.inner.goodbye_sent.swap(true, Ordering::SeqCst) {
            let goodbye = Message::Goodbye {
                details: Dict::new(),
                reason: SHUTDOWN_REASON.to_string(),
            };
            match self.send(&goodbye).await {
                Ok(()) => {
                    let wait = self.inner.options.goodbye_timeout;
                    if tokio::time::timeout(wait, self.inner.goodbye_reply.notified())
                        .await
                        .is_err()
                    {
                        tracing::warn!(?wait, "router did not answer GOODBYE");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to send GOODBYE"),
            }
        }

        self.close_transport().await
    }
}

fn unexpected(expected: &str, got: &Message) -> RuntimeError {
    RuntimeError::Protocol(format!(
        "expected {expected}, got message type {}",
        got.type_code()
    ))
}
