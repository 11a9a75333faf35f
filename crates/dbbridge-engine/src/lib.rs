//! Database backends for dbbridge.
//!
//! # Key types
//!
//! - [`BackendEngine`]: the capability set every adapter implements
//!   (connect, disconnect, query, operation, watch)
//! - [`EngineKind`]: the static registry of engine identifiers and
//!   their aliases
//! - [`EngineFactory`]: creates a fresh engine per joined session
//! - [`SqlEngine`] / [`SqlEngineFactory`]: the `sqlx` adapter for
//!   Postgres, MySQL, and SQLite
//!
//! ```text
//! "PG" ──resolve──→ EngineKind::Postgres ──factory──→ SqlEngine
//! ```

mod engine;
mod error;
mod kind;
mod sql;
mod watch;

pub use engine::{BackendEngine, EngineFactory, EngineOptions};
pub use error::EngineError;
pub use kind::EngineKind;
pub use sql::{SqlEngine, SqlEngineFactory};
pub use watch::{
    DEFAULT_WATCH_INTERVAL_MS, WatchReply, WatchRequest, WatchSubscription,
    WatchTable,
};
