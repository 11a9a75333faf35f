//! The engine registry: which identifiers name which backend variant.

use std::fmt;
use std::str::FromStr;

use crate::EngineError;

/// The backend families dbbridge can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Postgres,
    MySql,
    Sqlite,
}

/// Every accepted spelling, grouped by family. Matching is exact.
const ALIASES: &[(&str, EngineKind)] = &[
    ("PG9_4", EngineKind::Postgres),
    ("PG", EngineKind::Postgres),
    ("MYSQL14_14", EngineKind::MySql),
    ("MYSQL", EngineKind::MySql),
    ("SQLITE3_3_8_2", EngineKind::Sqlite),
    ("SQLITE3", EngineKind::Sqlite),
    ("SQLITE", EngineKind::Sqlite),
];

impl EngineKind {
    pub const ALL: [Self; 3] = [Self::Postgres, Self::MySql, Self::Sqlite];

    /// Resolves an engine identifier through the alias table.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedEngine`] for anything outside the table.
    pub fn resolve(identifier: &str) -> Result<Self, EngineError> {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == identifier)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| EngineError::UnsupportedEngine(identifier.to_string()))
    }

    /// All identifiers that resolve to this variant.
    pub fn aliases(self) -> impl Iterator<Item = &'static str> {
        ALIASES
            .iter()
            .filter(move |(_, kind)| *kind == self)
            .map(|(alias, _)| *alias)
    }

    /// The versioned identifier used in logs and connect acks.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Postgres => "PG9_4",
            Self::MySql => "MYSQL14_14",
            Self::Sqlite => "SQLITE3_3_8_2",
        }
    }

    /// Returns `true` if `dsn` uses a URL scheme this variant's driver reads.
    pub fn accepts_dsn(self, dsn: &str) -> bool {
        let schemes: &[&str] = match self {
            Self::Postgres => &["postgres://", "postgresql://"],
            Self::MySql => &["mysql://", "mariadb://"],
            Self::Sqlite => &["sqlite:"],
        };
        schemes.iter().any(|scheme| dsn.starts_with(scheme))
    }
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}
