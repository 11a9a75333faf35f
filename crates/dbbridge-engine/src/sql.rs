//! SQL adapter over `sqlx`'s Any driver.
//!
//! One implementation serves all three engine families; the
//! [`EngineKind`] decides which DSN schemes are accepted and how large the
//! connection pool may grow. Statements are passed to the driver verbatim,
//! so placeholders follow the backend's own syntax (`$1` for Postgres, `?`
//! for MySQL and SQLite).

use std::time::Duration;

use dbbridge_protocol::CallDetails;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde_json::{Map, Value, json};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Row};
use tokio::sync::{RwLock, oneshot};

use crate::{
    BackendEngine, EngineError, EngineFactory, EngineKind, EngineOptions,
    WatchReply, WatchRequest, WatchSubscription, WatchTable,
};

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`BackendEngine`] backed by a `sqlx` connection pool.
pub struct SqlEngine {
    kind: EngineKind,
    options: EngineOptions,
    pool: RwLock<Option<AnyPool>>,
    watches: WatchTable,
}

impl SqlEngine {
    pub fn new(kind: EngineKind, options: EngineOptions) -> Self {
        sqlx::any::install_default_drivers();
        Self {
            kind,
            options,
            pool: RwLock::new(None),
            watches: WatchTable::new(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// SQLite in-memory databases exist per connection, so SQLite gets a
    /// single shared connection.
    fn max_connections(&self) -> u32 {
        match self.kind {
            EngineKind::Sqlite => 1,
            EngineKind::Postgres | EngineKind::MySql => 5,
        }
    }

    async fn pool(&self) -> Result<AnyPool, EngineError> {
        self.pool.read().await.clone().ok_or(EngineError::NotConnected)
    }

    fn trace_statement(&self, what: &str, statement: &str, details: &CallDetails) {
        if self.options.debug {
            tracing::info!(engine = %self.kind, what, statement, caller = ?details.caller, "executing");
        } else {
            tracing::debug!(engine = %self.kind, what, statement, caller = ?details.caller, "executing");
        }
    }
}

impl BackendEngine for SqlEngine {
    async fn connect(
        &self,
        dsn: &str,
        details: &CallDetails,
    ) -> Result<Value, EngineError> {
        if !self.kind.accepts_dsn(dsn) {
            return Err(EngineError::Connection(format!(
                "DSN scheme does not match engine {}",
                self.kind
            )));
        }

        let pool = AnyPoolOptions::new()
            .max_connections(self.max_connections())
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(dsn)
            .await
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let previous = self.pool.write().await.replace(pool);
        if let Some(old) = previous {
            let cancelled = self.watches.cancel_all().await;
            old.close().await;
            tracing::info!(engine = %self.kind, cancelled, "replaced previous connection");
        }

        // The DSN may carry credentials, so it is never logged.
        tracing::info!(
            engine = %self.kind,
            caller = ?details.caller,
            "backend connected"
        );
        Ok(json!({"connected": true, "engine": self.kind.canonical_name()}))
    }

    async fn disconnect(
        &self,
        details: &CallDetails,
    ) -> Result<Value, EngineError> {
        let previous = self.pool.write().await.take();
        let cancelled = self.watches.cancel_all().await;
        if let Some(pool) = previous {
            pool.close().await;
            tracing::info!(
                engine = %self.kind,
                cancelled,
                caller = ?details.caller,
                "backend disconnected"
            );
        }
        Ok(json!({"connected": false}))
    }

    async fn query(
        &self,
        statement: &str,
        params: &[Value],
        details: &CallDetails,
    ) -> Result<Value, EngineError> {
        let pool = self.pool().await?;
        self.trace_statement("query", statement, details);
        fetch_rows(&pool, statement, params)
            .await
            .map_err(EngineError::Query)
    }

    async fn operation(
        &self,
        name: &str,
        params: &[Value],
        details: &CallDetails,
    ) -> Result<Value, EngineError> {
        let pool = self.pool().await?;
        self.trace_statement("operation", name, details);
        let result = bind_params(sqlx::query(name), params)
            .execute(&pool)
            .await
            .map_err(|e| EngineError::Operation(e.to_string()))?;
        Ok(json!({"rows_affected": result.rows_affected()}))
    }

    async fn watch(
        &self,
        request: WatchRequest,
        details: &CallDetails,
    ) -> Result<WatchReply, EngineError> {
        match request {
            WatchRequest::Cancel { cancel } => {
                if self.watches.cancel(&cancel).await {
                    tracing::info!(engine = %self.kind, id = %cancel, "watch cancelled");
                    Ok(WatchReply::Cancelled { id: cancel })
                } else {
                    Err(EngineError::InvalidArgument(format!(
                        "no live watch {cancel}"
                    )))
                }
            }
            WatchRequest::Start {
                statement,
                params,
                interval_ms,
            } => {
                if interval_ms == 0 {
                    return Err(EngineError::InvalidArgument(
                        "interval_ms must be positive".into(),
                    ));
                }
                // Held until the watch is in the table, so a disconnect or
                // reconnect either sees it or runs before it starts.
                let guard = self.pool.read().await;
                let pool = guard.clone().ok_or(EngineError::NotConnected)?;
                self.trace_statement("watch", &statement, details);

                // Run once up front so a bad statement fails the call
                // rather than the stream.
                let first = fetch_rows(&pool, &statement, &params)
                    .await
                    .map_err(EngineError::Watch)?;

                let (id, cancel) = self.watches.open().await;
                drop(guard);
                let topic = format!("{}.watch.{id}", self.options.topic_base);
                tracing::info!(engine = %self.kind, %id, %topic, "watch started");

                let events = poll_changes(PollState {
                    id: id.clone(),
                    pool,
                    statement,
                    params,
                    interval: Duration::from_millis(interval_ms),
                    pending: Some(first),
                    last: None,
                    cancel,
                });
                Ok(WatchReply::Started(WatchSubscription { id, topic, events }))
            }
        }
    }
}

/// Creates [`SqlEngine`]s for every [`EngineKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlEngineFactory;

impl EngineFactory for SqlEngineFactory {
    type Engine = SqlEngine;

    fn create(
        &self,
        kind: EngineKind,
        options: EngineOptions,
    ) -> Result<SqlEngine, EngineError> {
        Ok(SqlEngine::new(kind, options))
    }
}

// ---------------------------------------------------------------------------
// Watch polling
// ---------------------------------------------------------------------------

struct PollState {
    id: String,
    pool: AnyPool,
    statement: String,
    params: Vec<Value>,
    interval: Duration,
    pending: Option<Value>,
    last: Option<Value>,
    cancel: oneshot::Receiver<()>,
}

/// Re-runs the watched statement every `interval`, yielding an event
/// whenever the outcome differs from the previous one. The first snapshot
/// is yielded immediately.
fn poll_changes(state: PollState) -> BoxStream<'static, Value> {
    stream::unfold(state, |mut st| async move {
        if let Some(rows) = st.pending.take() {
            let event = json!({"id": st.id, "rows": rows});
            st.last = Some(event.clone());
            return Some((event, st));
        }
        loop {
            tokio::select! {
                _ = &mut st.cancel => return None,
                _ = tokio::time::sleep(st.interval) => {}
            }
            let event = match fetch_rows(&st.pool, &st.statement, &st.params).await {
                Ok(rows) => json!({"id": st.id, "rows": rows}),
                Err(e) => {
                    tracing::warn!(id = %st.id, error = %e, "watch poll failed");
                    json!({"id": st.id, "error": e})
                }
            };
            if st.last.as_ref() != Some(&event) {
                st.last = Some(event.clone());
                return Some((event, st));
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// Row and parameter conversion
// ---------------------------------------------------------------------------

async fn fetch_rows(
    pool: &AnyPool,
    statement: &str,
    params: &[Value],
) -> Result<Value, String> {
    let rows = bind_params(sqlx::query(statement), params)
        .fetch_all(pool)
        .await
        .map_err(|e| e.to_string())?;
    Ok(Value::Array(rows.iter().map(row_to_json).collect()))
}

/// Binds JSON parameters positionally. Arrays and objects are bound as
/// their JSON text.
fn bind_params<'q>(mut query: AnyQuery<'q>, params: &[Value]) -> AnyQuery<'q> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn row_to_json(row: &AnyRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_to_json(row, i));
    }
    Value::Object(object)
}

/// Decodes one column, trying the types the Any driver can represent.
fn column_to_json(row: &AnyRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v.map_or(Value::Null, |bytes| {
            Value::from(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
        });
    }
    Value::Null
}
