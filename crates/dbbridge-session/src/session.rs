//! Session configuration and lifecycle state.

use std::fmt;

use crate::SessionError;

/// Realm joined when none is configured.
pub const DEFAULT_REALM: &str = "realm1";

// ---------------------------------------------------------------------------
// AuthInfo
// ---------------------------------------------------------------------------

/// How the session authenticates when it joins.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// The auth method offered in HELLO, e.g. `wampcra`.
    pub auth_type: String,
    /// The `authid` offered in HELLO.
    pub auth_user: String,
    /// The secret used to answer challenges.
    pub auth_password: String,
}

impl AuthInfo {
    pub fn new(
        auth_type: impl Into<String>,
        auth_user: impl Into<String>,
        auth_password: impl Into<String>,
    ) -> Self {
        Self {
            auth_type: auth_type.into(),
            auth_user: auth_user.into(),
            auth_password: auth_password.into(),
        }
    }
}

// The password stays out of logs.
impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("auth_type", &self.auth_type)
            .field("auth_user", &self.auth_user)
            .field("auth_password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Everything the session component needs, fixed at construction.
///
/// Built through [`SessionConfig::builder`], which validates the shape of
/// each field. The engine identifier and topic base are optional here: a
/// session without them can still connect and authenticate, and fails
/// only when it joins.
///
/// ```
/// use dbbridge_session::{AuthInfo, SessionConfig};
///
/// let config = SessionConfig::builder()
///     .realm("realm1")
///     .engine("PG")
///     .topic_base("com.db")
///     .authinfo(AuthInfo::new("wampcra", "db", "dbsecret"))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.topic_base(), Some("com.db"));
/// assert_eq!(config.dsn(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    realm: String,
    engine: Option<String>,
    topic_base: Option<String>,
    dsn: Option<String>,
    authinfo: Option<AuthInfo>,
    debug: bool,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn engine(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    pub fn topic_base(&self) -> Option<&str> {
        self.topic_base.as_deref()
    }

    pub fn dsn(&self) -> Option<&str> {
        self.dsn.as_deref()
    }

    pub fn authinfo(&self) -> Option<&AuthInfo> {
        self.authinfo.as_ref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    realm: Option<String>,
    engine: Option<String>,
    topic_base: Option<String>,
    dsn: Option<String>,
    authinfo: Option<AuthInfo>,
    debug: bool,
}

impl SessionConfigBuilder {
    /// Defaults to [`DEFAULT_REALM`].
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Engine identifier or alias, e.g. `PG` or `SQLITE3`.
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn topic_base(mut self, topic_base: impl Into<String>) -> Self {
        self.topic_base = Some(topic_base.into());
        self
    }

    /// When set, the session connects the backend to this DSN as part
    /// of joining.
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// Without auth info the session joins anonymously.
    pub fn authinfo(mut self, authinfo: AuthInfo) -> Self {
        self.authinfo = Some(authinfo);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    /// [`SessionError::Config`] when the realm is empty, the auth type or
    /// user is empty, or the topic base is not a dotted URI prefix.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let realm = self.realm.unwrap_or_else(|| DEFAULT_REALM.to_string());
        if realm.trim().is_empty() {
            return Err(SessionError::Config("realm must not be empty".into()));
        }

        if let Some(auth) = &self.authinfo {
            if auth.auth_type.is_empty() {
                return Err(SessionError::Config("auth_type must not be empty".into()));
            }
            if auth.auth_user.is_empty() {
                return Err(SessionError::Config("auth_user must not be empty".into()));
            }
        }

        if let Some(topic_base) = &self.topic_base {
            validate_topic_base(topic_base)?;
        }

        Ok(SessionConfig {
            realm,
            engine: self.engine,
            topic_base: self.topic_base,
            dsn: self.dsn,
            authinfo: self.authinfo,
            debug: self.debug,
        })
    }
}

fn validate_topic_base(topic_base: &str) -> Result<(), SessionError> {
    let valid = topic_base
        .split('.')
        .all(|part| !part.is_empty() && !part.chars().any(char::is_whitespace));
    if valid {
        Ok(())
    } else {
        Err(SessionError::Config(format!(
            "topic_base {topic_base:?} must be dot-separated non-empty components"
        )))
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the session component is in its lifecycle.
///
/// ```text
///   Disconnected ──connect──→ Connecting ──join sent──→ Authenticating
///        ↑                                                    │
///        │                                               welcome
///        │                                                    ↓
///        └──────disconnect─────── Leaving ←──────leave────── Joined
/// ```
///
/// `Authenticating` covers the whole handshake, whether or not the router
/// challenges. A failed join leaves the state where it was; the runtime
/// then disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Joined,
    Leaving,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Joined => "joined",
            Self::Leaving => "leaving",
        };
        f.write_str(name)
    }
}
