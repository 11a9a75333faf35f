//! Watch requests, subscriptions, and the table of live watches.

use std::collections::HashMap;
use std::fmt;

use futures_util::stream::BoxStream;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

/// Default polling period for a watch that doesn't name one.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 1000;

/// What a caller can ask of the `watch` procedure.
///
/// ```json
/// {"statement": "select * from jobs where done = ?", "params": [false], "interval_ms": 500}
/// {"cancel": "9f0c2a4b1e7d3c55"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WatchRequest {
    Cancel {
        cancel: String,
    },
    Start {
        statement: String,
        #[serde(default)]
        params: Vec<Value>,
        #[serde(default = "default_interval")]
        interval_ms: u64,
    },
}

fn default_interval() -> u64 {
    DEFAULT_WATCH_INTERVAL_MS
}

/// A started watch.
///
/// `events` is lazy and potentially infinite; whoever holds it decides
/// how notifications reach subscribers. The WAMP runtime publishes each
/// one to `topic`.
pub struct WatchSubscription {
    pub id: String,
    pub topic: String,
    pub events: BoxStream<'static, Value>,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Result of a `watch` call.
#[derive(Debug)]
pub enum WatchReply {
    Started(WatchSubscription),
    Cancelled { id: String },
}

/// Live watches, keyed by id.
///
/// Each entry holds the sending half of a cancellation channel. Dropping
/// the table drops every sender, which ends every watch stream.
#[derive(Debug, Default)]
pub struct WatchTable {
    entries: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a watch id and the receiver its stream should select on.
    pub async fn open(&self) -> (String, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock().await;
        // Streams that were dropped without a cancel leave closed senders.
        entries.retain(|_, tx| !tx.is_closed());
        let mut id = generate_id();
        while entries.contains_key(&id) {
            id = generate_id();
        }
        entries.insert(id.clone(), tx);
        (id, rx)
    }

    /// Cancels one watch. Returns `false` if the id is unknown.
    pub async fn cancel(&self, id: &str) -> bool {
        match self.entries.lock().await.remove(id) {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Cancels every watch, returning how many were live.
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<_> =
            self.entries.lock().await.drain().map(|(_, tx)| tx).collect();
        let count = drained.len();
        for tx in drained {
            let _ = tx.send(());
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// Generates a random 16-character hex id (64 bits).
fn generate_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
