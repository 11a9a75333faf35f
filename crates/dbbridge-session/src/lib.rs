//! The database session component for dbbridge.
//!
//! A [`DbSession`] is driven by a WAMP runtime through its lifecycle hooks.
//! Once the session joins a realm it exposes five procedures under the
//! configured topic base and forwards every call to a backend engine:
//!
//! ```text
//! com.db.connect     ─┐
//! com.db.disconnect   │
//! com.db.query        ├──→ DbSession ──→ BackendEngine
//! com.db.operation    │
//! com.db.watch       ─┘
//! ```
//!
//! # How it fits in the stack
//!
//! ```text
//! Meta crate (above)   ← WampClient implements SessionRuntime, runner calls the hooks
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Engine + Protocol (below)
//! ```
//!
//! The runtime side is abstracted as the [`SessionRuntime`] trait, so the
//! component can be exercised without a router.

#![allow(async_fn_in_trait)]

pub mod auth;
mod component;
mod error;
mod registration;
mod runtime;
mod session;

pub use auth::{AuthChallenge, WAMPCRA};
pub use component::{ANONYMOUS, ANONYMOUS_USER, DbSession, LeaveReport};
pub use error::SessionError;
pub use registration::{DbProcedure, RegistrationSet};
pub use runtime::{
    CallError, Procedure, ProcedureFuture, Reply, RuntimeError, SessionRuntime,
};
pub use session::{
    AuthInfo, DEFAULT_REALM, SessionConfig, SessionConfigBuilder, SessionState,
};
