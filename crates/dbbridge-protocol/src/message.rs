//! The WAMP v2 message set used by a caller/callee/publisher client.
//!
//! On the wire every message is a JSON array whose first element is the
//! message type code:
//!
//! ```text
//! [64, 12, {}, "com.db.query"]   // REGISTER request 12
//! [65, 12, 4021]                 // REGISTERED, registration 4021
//! ```
//!
//! Trailing `Arguments`/`ArgumentsKw` elements are omitted when empty, the
//! way routers expect.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{ProtocolError, RegistrationId, RequestId, SessionId};

/// A WAMP dictionary (`Details`, `Options`, `Extra`, `ArgumentsKw`).
pub type Dict = serde_json::Map<String, Value>;

/// Message type codes from the WAMP basic and advanced profiles.
pub mod code {
    pub const HELLO: u64 = 1;
    pub const WELCOME: u64 = 2;
    pub const ABORT: u64 = 3;
    pub const CHALLENGE: u64 = 4;
    pub const AUTHENTICATE: u64 = 5;
    pub const GOODBYE: u64 = 6;
    pub const ERROR: u64 = 8;
    pub const PUBLISH: u64 = 16;
    pub const PUBLISHED: u64 = 17;
    pub const CALL: u64 = 48;
    pub const RESULT: u64 = 50;
    pub const REGISTER: u64 = 64;
    pub const REGISTERED: u64 = 65;
    pub const UNREGISTER: u64 = 66;
    pub const UNREGISTERED: u64 = 67;
    pub const INVOCATION: u64 = 68;
    pub const YIELD: u64 = 70;
}

/// One WAMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello {
        realm: String,
        details: Dict,
    },
    Welcome {
        session: SessionId,
        details: Dict,
    },
    Abort {
        details: Dict,
        reason: String,
    },
    Challenge {
        method: String,
        extra: Dict,
    },
    Authenticate {
        signature: String,
        extra: Dict,
    },
    Goodbye {
        details: Dict,
        reason: String,
    },
    Error {
        request_type: u64,
        request: RequestId,
        details: Dict,
        error: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Publish {
        request: RequestId,
        options: Dict,
        topic: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Published {
        request: RequestId,
        publication: u64,
    },
    Call {
        request: RequestId,
        options: Dict,
        procedure: String,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Result {
        request: RequestId,
        details: Dict,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Register {
        request: RequestId,
        options: Dict,
        procedure: String,
    },
    Registered {
        request: RequestId,
        registration: RegistrationId,
    },
    Unregister {
        request: RequestId,
        registration: RegistrationId,
    },
    Unregistered {
        request: RequestId,
    },
    Invocation {
        request: RequestId,
        registration: RegistrationId,
        details: Dict,
        args: Vec<Value>,
        kwargs: Dict,
    },
    Yield {
        request: RequestId,
        options: Dict,
        args: Vec<Value>,
        kwargs: Dict,
    },
}

impl Message {
    /// The numeric type code that leads the wire array.
    pub fn type_code(&self) -> u64 {
        match self {
            Self::Hello { .. } => code::HELLO,
            Self::Welcome { .. } => code::WELCOME,
            Self::Abort { .. } => code::ABORT,
            Self::Challenge { .. } => code::CHALLENGE,
            Self::Authenticate { .. } => code::AUTHENTICATE,
            Self::Goodbye { .. } => code::GOODBYE,
            Self::Error { .. } => code::ERROR,
            Self::Publish { .. } => code::PUBLISH,
            Self::Published { .. } => code::PUBLISHED,
            Self::Call { .. } => code::CALL,
            Self::Result { .. } => code::RESULT,
            Self::Register { .. } => code::REGISTER,
            Self::Registered { .. } => code::REGISTERED,
            Self::Unregister { .. } => code::UNREGISTER,
            Self::Unregistered { .. } => code::UNREGISTERED,
            Self::Invocation { .. } => code::INVOCATION,
            Self::Yield { .. } => code::YIELD,
        }
    }

    /// For router replies, the id of the request being answered.
    ///
    /// `None` for session-level messages and for requests the router
    /// initiates (INVOCATION).
    pub fn reply_to(&self) -> Option<RequestId> {
        match self {
            Self::Error { request, .. }
            | Self::Published { request, .. }
            | Self::Result { request, .. }
            | Self::Registered { request, .. }
            | Self::Unregistered { request } => Some(*request),
            _ => None,
        }
    }

    /// Builds the JSON array representation.
    pub fn to_value(&self) -> Value {
        let mut out = vec![Value::from(self.type_code())];
        match self {
            Self::Hello { realm, details } => {
                out.push(realm.as_str().into());
                out.push(Value::Object(details.clone()));
            }
            Self::Welcome { session, details } => {
                out.push(session.0.into());
                out.push(Value::Object(details.clone()));
            }
            Self::Abort { details, reason }
            | Self::Goodbye { details, reason } => {
                out.push(Value::Object(details.clone()));
                out.push(reason.as_str().into());
            }
            Self::Challenge { method, extra } => {
                out.push(method.as_str().into());
                out.push(Value::Object(extra.clone()));
            }
            Self::Authenticate { signature, extra } => {
                out.push(signature.as_str().into());
                out.push(Value::Object(extra.clone()));
            }
            Self::Error {
                request_type,
                request,
                details,
                error,
                args,
                kwargs,
            } => {
                out.push((*request_type).into());
                out.push(request.0.into());
                out.push(Value::Object(details.clone()));
                out.push(error.as_str().into());
                push_payload(&mut out, args, kwargs);
            }
            Self::Publish {
                request,
                options,
                topic,
                args,
                kwargs,
            } => {
                out.push(request.0.into());
                out.push(Value::Object(options.clone()));
                out.push(topic.as_str().into());
                push_payload(&mut out, args, kwargs);
            }
            Self::Published {
                request,
                publication,
            } => {
                out.push(request.0.into());
                out.push((*publication).into());
            }
            Self::Call {
                request,
                options,
                procedure,
                args,
                kwargs,
            } => {
                out.push(request.0.into());
                out.push(Value::Object(options.clone()));
                out.push(procedure.as_str().into());
                push_payload(&mut out, args, kwargs);
            }
            Self::Result {
                request,
                details,
                args,
                kwargs,
            } => {
                out.push(request.0.into());
                out.push(Value::Object(details.clone()));
                push_payload(&mut out, args, kwargs);
            }
            Self::Register {
                request,
                options,
                procedure,
            } => {
                out.push(request.0.into());
                out.push(Value::Object(options.clone()));
                out.push(procedure.as_str().into());
            }
            Self::Registered {
                request,
                registration,
            }
            | Self::Unregister {
                request,
                registration,
            } => {
                out.push(request.0.into());
                out.push(registration.0.into());
            }
            Self::Unregistered { request } => {
                out.push(request.0.into());
            }
            Self::Invocation {
                request,
                registration,
                details,
                args,
                kwargs,
            } => {
                out.push(request.0.into());
                out.push(registration.0.into());
                out.push(Value::Object(details.clone()));
                push_payload(&mut out, args, kwargs);
            }
            Self::Yield {
                request,
                options,
                args,
                kwargs,
            } => {
                out.push(request.0.into());
                out.push(Value::Object(options.clone()));
                push_payload(&mut out, args, kwargs);
            }
        }
        Value::Array(out)
    }

    /// Parses the JSON array representation.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownMessageType`] for codes outside the
    ///   supported set
    /// - [`ProtocolError::InvalidMessage`] for missing or mistyped elements
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(items) = value else {
            return Err(ProtocolError::InvalidMessage(
                "message must be an array".into(),
            ));
        };
        let mut f = Fields {
            items: items.into_iter(),
        };
        let kind = f.id("message type")?;

        let msg = match kind {
            code::HELLO => Self::Hello {
                realm: f.string("realm")?,
                details: f.dict("details")?,
            },
            code::WELCOME => Self::Welcome {
                session: SessionId(f.id("session")?),
                details: f.dict("details")?,
            },
            code::ABORT => Self::Abort {
                details: f.dict("details")?,
                reason: f.string("reason")?,
            },
            code::CHALLENGE => Self::Challenge {
                method: f.string("authmethod")?,
                extra: f.dict("extra")?,
            },
            code::AUTHENTICATE => Self::Authenticate {
                signature: f.string("signature")?,
                extra: f.dict("extra")?,
            },
            code::GOODBYE => Self::Goodbye {
                details: f.dict("details")?,
                reason: f.string("reason")?,
            },
            code::ERROR => Self::Error {
                request_type: f.id("request type")?,
                request: RequestId(f.id("request")?),
                details: f.dict("details")?,
                error: f.string("error")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            code::PUBLISH => Self::Publish {
                request: RequestId(f.id("request")?),
                options: f.dict("options")?,
                topic: f.string("topic")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            code::PUBLISHED => Self::Published {
                request: RequestId(f.id("request")?),
                publication: f.id("publication")?,
            },
            code::CALL => Self::Call {
                request: RequestId(f.id("request")?),
                options: f.dict("options")?,
                procedure: f.string("procedure")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            code::RESULT => Self::Result {
                request: RequestId(f.id("request")?),
                details: f.dict("details")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            code::REGISTER => Self::Register {
                request: RequestId(f.id("request")?),
                options: f.dict("options")?,
                procedure: f.string("procedure")?,
            },
            code::REGISTERED => Self::Registered {
                request: RequestId(f.id("request")?),
                registration: RegistrationId(f.id("registration")?),
            },
            code::UNREGISTER => Self::Unregister {
                request: RequestId(f.id("request")?),
                registration: RegistrationId(f.id("registration")?),
            },
            code::UNREGISTERED => Self::Unregistered {
                request: RequestId(f.id("request")?),
            },
            code::INVOCATION => Self::Invocation {
                request: RequestId(f.id("request")?),
                registration: RegistrationId(f.id("registration")?),
                details: f.dict("details")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            code::YIELD => Self::Yield {
                request: RequestId(f.id("request")?),
                options: f.dict("options")?,
                args: f.args()?,
                kwargs: f.kwargs()?,
            },
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };
        Ok(msg)
    }
}

fn push_payload(out: &mut Vec<Value>, args: &[Value], kwargs: &Dict) {
    if args.is_empty() && kwargs.is_empty() {
        return;
    }
    out.push(Value::Array(args.to_vec()));
    if !kwargs.is_empty() {
        out.push(Value::Object(kwargs.clone()));
    }
}

/// Sequential reader over the elements of a message array.
struct Fields {
    items: std::vec::IntoIter<Value>,
}

impl Fields {
    fn next(&mut self, what: &str) -> Result<Value, ProtocolError> {
        self.items
            .next()
            .ok_or_else(|| ProtocolError::InvalidMessage(format!("missing {what}")))
    }

    fn id(&mut self, what: &str) -> Result<u64, ProtocolError> {
        self.next(what)?.as_u64().ok_or_else(|| {
            ProtocolError::InvalidMessage(format!("{what} must be an id"))
        })
    }

    fn string(&mut self, what: &str) -> Result<String, ProtocolError> {
        match self.next(what)? {
            Value::String(s) => Ok(s),
            _ => Err(ProtocolError::InvalidMessage(format!(
                "{what} must be a string"
            ))),
        }
    }

    fn dict(&mut self, what: &str) -> Result<Dict, ProtocolError> {
        match self.next(what)? {
            Value::Object(map) => Ok(map),
            _ => Err(ProtocolError::InvalidMessage(format!(
                "{what} must be a dict"
            ))),
        }
    }

    fn args(&mut self) -> Result<Vec<Value>, ProtocolError> {
        match self.items.next() {
            None => Ok(Vec::new()),
            Some(Value::Array(list)) => Ok(list),
            Some(_) => Err(ProtocolError::InvalidMessage(
                "arguments must be a list".into(),
            )),
        }
    }

    fn kwargs(&mut self) -> Result<Dict, ProtocolError> {
        match self.items.next() {
            None => Ok(Dict::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(ProtocolError::InvalidMessage(
                "keyword arguments must be a dict".into(),
            )),
        }
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(d)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}
