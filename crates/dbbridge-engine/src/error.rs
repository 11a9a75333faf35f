//! Error types for the engine layer.

/// Errors a backend engine can report.
///
/// Everything except [`UnsupportedEngine`](Self::UnsupportedEngine) is
/// call-scoped: it goes back to the one peer whose call failed and never
/// ends the session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The DSN was unreachable, malformed, or for a different engine.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The backend rejected a query.
    #[error("query failed: {0}")]
    Query(String),

    /// The backend rejected an operation.
    #[error("operation failed: {0}")]
    Operation(String),

    /// A watch could not be started or cancelled.
    #[error("watch failed: {0}")]
    Watch(String),

    /// The call needs a connection and `connect` hasn't succeeded yet.
    #[error("not connected")]
    NotConnected,

    /// The caller's arguments were missing or of the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine identifier is not in the alias table.
    #[error("unsupported engine {0:?}")]
    UnsupportedEngine(String),
}

impl EngineError {
    /// Short machine-readable name, used as the last segment of the
    /// error URI sent back to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Query(_) => "query",
            Self::Operation(_) => "operation",
            Self::Watch(_) => "watch",
            Self::NotConnected => "not_connected",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnsupportedEngine(_) => "unsupported_engine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_uri_segments() {
        let errors = [
            EngineError::Connection("x".into()),
            EngineError::Query("x".into()),
            EngineError::Operation("x".into()),
            EngineError::Watch("x".into()),
            EngineError::NotConnected,
            EngineError::InvalidArgument("x".into()),
            EngineError::UnsupportedEngine("x".into()),
        ];

        for err in &errors {
            let kind = err.kind();
            assert!(
                kind.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{kind} is not a valid URI segment"
            );
        }
    }

    #[test]
    fn test_display_includes_detail() {
        let err = EngineError::Query("syntax error at or near \"selec\"".into());
        assert!(err.to_string().contains("selec"));
    }
}
