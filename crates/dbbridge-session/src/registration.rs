//! The five database procedures and the set of their registrations.

use std::fmt;

use dbbridge_protocol::RegistrationId;

/// One of the procedures a joined session exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbProcedure {
    Connect,
    Disconnect,
    Query,
    Operation,
    Watch,
}

impl DbProcedure {
    /// Registration order on join, which is also unregistration order on
    /// leave.
    pub const ALL: [Self; 5] = [
        Self::Connect,
        Self::Disconnect,
        Self::Query,
        Self::Operation,
        Self::Watch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Query => "query",
            Self::Operation => "operation",
            Self::Watch => "watch",
        }
    }

    /// The procedure URI under `topic_base`.
    pub fn uri(self, topic_base: &str) -> String {
        format!("{topic_base}.{}", self.as_str())
    }
}

impl fmt::Display for DbProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The registrations of a joined session: always all five.
///
/// A partial set cannot be constructed, so holding a `RegistrationSet`
/// means every procedure is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSet {
    ids: [RegistrationId; 5],
}

impl RegistrationSet {
    /// Builds the set from registrations made in [`DbProcedure::ALL`]
    /// order. Returns `None` unless exactly those five are present, in
    /// that order.
    pub fn from_ordered(made: &[(DbProcedure, RegistrationId)]) -> Option<Self> {
        if made.len() != DbProcedure::ALL.len() {
            return None;
        }
        let mut ids = [RegistrationId(0); 5];
        for (slot, (expected, (procedure, id))) in
            ids.iter_mut().zip(DbProcedure::ALL.iter().zip(made))
        {
            if procedure != expected {
                return None;
            }
            *slot = *id;
        }
        Some(Self { ids })
    }

    pub fn get(&self, procedure: DbProcedure) -> RegistrationId {
        self.ids[procedure as usize]
    }

    /// Entries in [`DbProcedure::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (DbProcedure, RegistrationId)> + '_ {
        DbProcedure::ALL.into_iter().zip(self.ids.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
