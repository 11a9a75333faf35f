//! The reader task: routes every incoming message.
//!
//! One task per client sits in `recv` for the life of the connection:
//!   1. Router replies (REGISTERED, RESULT, ERROR, ...) resolve the
//!      matching in-flight request
//!   2. INVOCATIONs are dispatched to the registered procedure on their
//!      own task and answered with YIELD or ERROR
//!   3. Session-level messages are forwarded to the runner as
//!      [`SessionEvent`]s

use std::sync::atomic::Ordering;

use dbbridge_protocol::{
    CallDetails, CloseDetails, Dict, Invocation, Message, RegistrationId,
    RequestId, SessionId, code,
};
use dbbridge_session::{CallError, Reply};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::WampClient;

/// Reason sent when answering a router's GOODBYE.
const GOODBYE_AND_OUT: &str = "wamp.close.goodbye_and_out";

/// Session-level traffic, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Challenge { method: String, extra: Dict },
    Welcome { session: SessionId, details: Dict },
    /// The router refused or ended the handshake.
    Abort(CloseDetails),
    /// The router ended the session. Our reply is already sent.
    Goodbye(CloseDetails),
    /// The transport is gone.
    Closed,
}

pub(crate) async fn run_reader(client: WampClient, events: mpsc::UnboundedSender<SessionEvent>) {
    loop {
        let bytes = match client.recv().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::info!("router closed the connection");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "recv error");
                break;
            }
        };

        let message = match client.decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode message");
                continue;
            }
        };

        if let Some(event) = route(&client, message).await {
            // The runner may have stopped listening; the reader keeps
            // serving replies until the transport closes.
            let _ = events.send(event);
        }
    }

    client.inner.closed.store(true, Ordering::SeqCst);
    client.inner.joined.store(false, Ordering::SeqCst);
    client.abort_pumps().await;
    client.drop_procedures().await;
    client.fail_pending().await;
    let _ = events.send(SessionEvent::Closed);
}

async fn route(client: &WampClient, message: Message) -> Option<SessionEvent> {
    match message {
        Message::Challenge { method, extra } => {
            tracing::debug!(%method, "challenge received");
            Some(SessionEvent::Challenge { method, extra })
        }
        Message::Welcome { session, details } => {
            client.inner.joined.store(true, Ordering::SeqCst);
            tracing::debug!(%session, "welcome received");
            Some(SessionEvent::Welcome { session, details })
        }
        Message::Abort { details, reason } => {
            let close = CloseDetails::from_wire(&details, &reason);
            tracing::warn!(%close, "session aborted by router");
            Some(SessionEvent::Abort(close))
        }
        Message::Goodbye { details, reason } => {
            client.inner.joined.store(false, Ordering::SeqCst);
            if client.inner.goodbye_sent.swap(true, Ordering::SeqCst) {
                // The router is answering ours.
                client.inner.goodbye_reply.notify_one();
                return None;
            }
            let close = CloseDetails::from_wire(&details, &reason);
            tracing::info!(%close, "router said goodbye");
            let reply = Message::Goodbye {
                details: Dict::new(),
                reason: GOODBYE_AND_OUT.to_string(),
            };
            if let Err(e) = client.send(&reply).await {
                tracing::debug!(error = %e, "failed to answer GOODBYE");
            }
            Some(SessionEvent::Goodbye(close))
        }
        Message::Invocation {
            request,
            registration,
            details,
            args,
            kwargs,
        } => {
            dispatch_invocation(client, request, registration, details, args, kwargs).await;
            None
        }
        reply @ (Message::Registered { .. }
        | Message::Unregistered { .. }
        | Message::Result { .. }
        | Message::Published { .. }
        | Message::Error { .. }) => {
            resolve(client, reply).await;
            None
        }
        other => {
            tracing::debug!(code = other.type_code(), "ignoring unexpected message");
            None
        }
    }
}

/// Hands a router reply to whoever is waiting for it.
async fn resolve(client: &WampClient, reply: Message) {
    let Some(request) = reply.reply_to() else {
        return;
    };
    let Some(pending) = client.inner.pending.lock().await.remove(&request) else {
        tracing::debug!(%request, "reply for unknown request");
        return;
    };
    if let (Message::Registered { registration, .. }, Some(procedure)) = (&reply, pending.install) {
        client.inner.procedures.lock().await.insert(*registration, procedure);
    }
    let _ = pending.reply.send(reply);
}

async fn dispatch_invocation(
    client: &WampClient,
    request: RequestId,
    registration: RegistrationId,
    details: Dict,
    args: Vec<Value>,
    kwargs: Dict,
) {
    let procedure = client.inner.procedures.lock().await.get(&registration).cloned();
    let Some(procedure) = procedure else {
        tracing::debug!(%request, %registration, "invocation for unknown registration");
        let error = CallError::new("wamp.error.no_such_registration", registration.to_string());
        if let Err(e) = client.send(&error_reply(request, error)).await {
            tracing::debug!(error = %e, "failed to send ERROR");
        }
        return;
    };

    let invocation = Invocation {
        args,
        kwargs,
        details: CallDetails::from_invocation(&details),
    };
    tracing::debug!(%request, %registration, caller = ?invocation.details.caller, "invocation");

    let client = client.clone();
    tokio::spawn(async move {
        let reply = match procedure(invocation).await {
            Ok(Reply::Value(value)) => yield_reply(request, value),
            Ok(Reply::Subscription(subscription)) => {
                let handle = json!({"id": subscription.id, "topic": subscription.topic});
                client.spawn_pump(subscription).await;
                yield_reply(request, handle)
            }
            Err(error) => {
                tracing::debug!(%request, uri = %error.uri, "invocation failed");
                error_reply(request, error)
            }
        };
        if let Err(e) = client.send(&reply).await {
            tracing::debug!(%request, error = %e, "failed to answer invocation");
        }
    });
}

fn yield_reply(request: RequestId, value: Value) -> Message {
    Message::Yield {
        request,
        options: Dict::new(),
        args: vec![value],
        kwargs: Dict::new(),
    }
}

fn error_reply(request: RequestId, error: CallError) -> Message {
    Message::Error {
        request_type: code::INVOCATION,
        request,
        details: Dict::new(),
        error: error.uri,
        args: vec![Value::from(error.message)],
        kwargs: Dict::new(),
    }
}
