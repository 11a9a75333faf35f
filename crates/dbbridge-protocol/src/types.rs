//! Identifier newtypes and the typed views over WAMP detail dictionaries.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Dict;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The session id a router assigns in WELCOME.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A session-scoped request id, chosen by whoever sends the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

/// The registration handle returned in REGISTERED.
///
/// Required to unregister the procedure later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Session details
// ---------------------------------------------------------------------------

/// What the router told us when the session was established.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDetails {
    pub realm: String,
    pub session: Option<SessionId>,
    pub authid: Option<String>,
    pub authrole: Option<String>,
    pub authmethod: Option<String>,
}

impl SessionDetails {
    /// Builds the view from a WELCOME message's details.
    pub fn from_welcome(realm: &str, session: SessionId, details: &Dict) -> Self {
        Self {
            realm: realm.to_string(),
            session: Some(session),
            authid: string_field(details, "authid"),
            authrole: string_field(details, "authrole"),
            authmethod: string_field(details, "authmethod"),
        }
    }
}

impl fmt::Display for SessionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "realm={}", self.realm)?;
        if let Some(session) = self.session {
            write!(f, " session={session}")?;
        }
        if let Some(authid) = &self.authid {
            write!(f, " authid={authid}")?;
        }
        if let Some(authrole) = &self.authrole {
            write!(f, " authrole={authrole}")?;
        }
        Ok(())
    }
}

/// Why a session ended (from GOODBYE or ABORT, or synthesized locally).
#[derive(Debug, Clone, PartialEq)]
pub struct CloseDetails {
    pub reason: String,
    pub message: Option<String>,
}

impl CloseDetails {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: None,
        }
    }

    /// Builds the view from GOODBYE/ABORT details and reason URI.
    pub fn from_wire(details: &Dict, reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            message: string_field(details, "message"),
        }
    }
}

impl fmt::Display for CloseDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({message})", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Call metadata
// ---------------------------------------------------------------------------

/// Caller metadata attached to an invocation.
///
/// Populated only when the router discloses the caller (the callee asks
/// for this with `disclose_caller` at registration).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDetails {
    pub procedure: Option<String>,
    pub caller: Option<SessionId>,
    pub caller_authid: Option<String>,
    pub caller_authrole: Option<String>,
}

impl CallDetails {
    /// Metadata for a call made locally rather than routed from a peer.
    pub fn local(procedure: impl Into<String>) -> Self {
        Self {
            procedure: Some(procedure.into()),
            ..Self::default()
        }
    }

    /// Builds the view from INVOCATION details.
    pub fn from_invocation(details: &Dict) -> Self {
        Self {
            procedure: string_field(details, "procedure"),
            caller: details.get("caller").and_then(Value::as_u64).map(SessionId),
            caller_authid: string_field(details, "caller_authid"),
            caller_authrole: string_field(details, "caller_authrole"),
        }
    }
}

/// A routed call, as delivered to a registered procedure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub args: Vec<Value>,
    pub kwargs: Dict,
    pub details: CallDetails,
}

impl Invocation {
    /// Looks up a parameter by keyword first, then by position.
    pub fn param(&self, position: usize, keyword: &str) -> Option<&Value> {
        self.kwargs.get(keyword).or_else(|| self.args.get(position))
    }
}

fn string_field(details: &Dict, key: &str) -> Option<String> {
    details.get(key).and_then(Value::as_str).map(str::to_string)
}
