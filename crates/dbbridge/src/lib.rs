//! # dbbridge
//!
//! Expose a SQL database to a WAMP realm as five remote procedures.
//!
//! dbbridge joins a router as an ordinary client, authenticates with
//! WAMP-CRA, and registers `connect`, `disconnect`, `query`, `operation`,
//! and `watch` under a topic base. Every call is forwarded to a backend
//! engine; watch notifications are published back to the realm.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbbridge::prelude::*;
//!
//! # async fn run() -> Result<(), BridgeError> {
//! let config = SessionConfig::builder()
//!     .realm("realm1")
//!     .engine("PG")
//!     .topic_base("com.db")
//!     .dsn("postgres://db@localhost/app")
//!     .authinfo(AuthInfo::new("wampcra", "db", "dbsecret"))
//!     .build()?;
//! let mut session = DbSession::new(config, SqlEngineFactory);
//!
//! ApplicationRunner::new(DEFAULT_URL)
//!     .run(&mut session, std::future::pending())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod handler;
mod runner;

pub use client::{ClientOptions, WampClient};
pub use error::BridgeError;
pub use handler::SessionEvent;
pub use runner::{ApplicationRunner, DEFAULT_URL};

pub mod prelude {
    pub use crate::{ApplicationRunner, BridgeError, DEFAULT_URL, WampClient};
    pub use dbbridge_engine::{
        BackendEngine, EngineFactory, EngineKind, SqlEngineFactory,
    };
    pub use dbbridge_session::{
        AuthInfo, DbSession, SessionConfig, SessionRuntime, SessionState,
    };
}
