//! WAMP wire protocol for dbbridge.
//!
//! This crate defines the messages a dbbridge client exchanges with a
//! WAMP router:
//!
//! - **Messages** ([`Message`]) : the WAMP v2 subset used by a
//!   caller/callee/publisher, with JSON-array encoding.
//! - **Types** ([`SessionId`], [`RegistrationId`], [`CallDetails`], etc.) :
//!   typed ids and typed views over the detail dictionaries.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) : how messages become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (DbSession hooks)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{Dict, Message, code};
pub use types::{
    CallDetails, CloseDetails, Invocation, RegistrationId, RequestId,
    SessionDetails, SessionId,
};
