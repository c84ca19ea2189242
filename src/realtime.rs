//! Realtime Database access
//!
//! The site uses the Realtime Database only for presence: the
//! `.info/connected` signal, `client-status/{userId}` records and
//! `connection-test/{timestamp}` probes. Over REST there is no
//! `.info/connected` node, so [`RestRealtimeDb`] derives connection state by
//! polling the database root.

use crate::config::FirebaseConfig;
use crate::error::FirebaseError;
use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

/// Stream of connection states, current state first
pub type ConnectionStream = Pin<Box<dyn Stream<Item = bool> + Send>>;

/// Realtime Database operations used by the presence layer
#[async_trait]
pub trait RealtimeDatabase: Send + Sync {
    /// `.info/connected`: yields the current state, then every change
    fn connection_states(&self) -> ConnectionStream;

    /// Write `value` at `path`
    async fn set(&self, path: &str, value: Value) -> Result<(), FirebaseError>;

    /// Remove the value at `path`
    async fn remove(&self, path: &str) -> Result<(), FirebaseError>;
}

/// Realtime Database REST client
#[derive(Clone)]
pub struct RestRealtimeDb {
    inner: Arc<RestRealtimeDbInner>,
}

struct RestRealtimeDbInner {
    base_url: String,
    namespace: Option<String>,
    http_client: reqwest::Client,
    id_token: RwLock<Option<String>>,
    poll_interval: Duration,
}

impl RestRealtimeDb {
    /// Default interval between connectivity polls
    pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

    /// Create a client for the configured database
    pub fn new(config: &FirebaseConfig) -> Result<Self, FirebaseError> {
        let Some(database_url) = config.realtime_database_url() else {
            return Err(FirebaseError::Config("Database URL is not configured".to_string()));
        };
        let (base_url, namespace) = match &config.emulators {
            // Emulator addresses databases by the `ns` query parameter
            Some(emulators) => (
                emulators.database_url(),
                Some(format!("{}-default-rtdb", config.project_id)),
            ),
            None => (database_url, None),
        };
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FirebaseError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestRealtimeDbInner {
                base_url,
                namespace,
                http_client,
                id_token: RwLock::new(None),
                poll_interval: Self::POLL_INTERVAL,
            }),
        })
    }

    /// Use `token` for subsequent requests
    pub async fn set_id_token(&self, token: Option<String>) {
        *self.inner.id_token.write().await = token;
    }

    fn path_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.inner.base_url, path.trim_matches('/'))
    }

    async fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ns) = &self.inner.namespace {
            params.push(("ns", ns.clone()));
        }
        if let Some(token) = self.inner.id_token.read().await.as_deref() {
            params.push(("auth", token.to_string()));
        }
        params
    }

    /// One shallow read of the root; true if the server answered at all
    async fn ping(&self) -> bool {
        let mut params = self.query_params().await;
        params.push(("shallow", "true".to_string()));
        let url = format!("{}/.json", self.inner.base_url);
        match self.inner.http_client.get(url).query(&params).send().await {
            // Any HTTP answer (including 401 from rules) means the server is reachable
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("realtime database ping failed: {}", e);
                false
            }
        }
    }

    async fn check(response: reqwest::Response, path: &str) -> Result<(), FirebaseError> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body["error"].as_str().unwrap_or("request rejected");
        Err(FirebaseError::Database(format!("{} ({}): {}", path, status, message)))
    }
}

#[async_trait]
impl RealtimeDatabase for RestRealtimeDb {
    fn connection_states(&self) -> ConnectionStream {
        let client = self.clone();
        Box::pin(stream! {
            let mut last = None;
            loop {
                let connected = client.ping().await;
                if last != Some(connected) {
                    last = Some(connected);
                    yield connected;
                }
                tokio::time::sleep(client.inner.poll_interval).await;
            }
        })
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), FirebaseError> {
        let params = self.query_params().await;
        let response = self
            .inner
            .http_client
            .put(self.path_url(path))
            .query(&params)
            .json(&value)
            .send()
            .await?;
        Self::check(response, path).await
    }

    async fn remove(&self, path: &str) -> Result<(), FirebaseError> {
        let params = self.query_params().await;
        let response = self
            .inner
            .http_client
            .delete(self.path_url(path))
            .query(&params)
            .send()
            .await?;
        Self::check(response, path).await
    }
}

impl std::fmt::Debug for RestRealtimeDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRealtimeDb")
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

/// In-memory [`RealtimeDatabase`] with a controllable connection
///
/// Writes fail while disconnected, the same way a probe would against an
/// unreachable server.
#[derive(Clone)]
pub struct MemoryRealtimeDb {
    inner: Arc<MemoryRealtimeDbInner>,
}

struct MemoryRealtimeDbInner {
    connected: watch::Sender<bool>,
    values: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryRealtimeDb {
    /// Create a database in the given connection state
    pub fn new(connected: bool) -> Self {
        let (tx, _) = watch::channel(connected);
        Self {
            inner: Arc::new(MemoryRealtimeDbInner {
                connected: tx,
                values: Mutex::new(HashMap::new()),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Change the connection state, notifying `.info/connected` listeners
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.send_replace(connected);
    }

    /// Number of write attempts (set and remove), failed ones included
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Value stored at `path`
    pub async fn value(&self, path: &str) -> Option<Value> {
        self.inner.values.lock().await.get(path).cloned()
    }

    /// Paths with stored values under `prefix`, sorted
    pub async fn paths_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .inner
            .values
            .lock()
            .await
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    fn begin_write(&self, path: &str) -> Result<(), FirebaseError> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        if !*self.inner.connected.borrow() {
            return Err(FirebaseError::Database(format!("{}: client is offline", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeDatabase for MemoryRealtimeDb {
    fn connection_states(&self) -> ConnectionStream {
        Box::pin(tokio_stream::wrappers::WatchStream::new(
            self.inner.connected.subscribe(),
        ))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), FirebaseError> {
        self.begin_write(path)?;
        self.inner.values.lock().await.insert(path.to_string(), value);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), FirebaseError> {
        self.begin_write(path)?;
        self.inner.values.lock().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_connection_stream_yields_current_then_changes() {
        let db = MemoryRealtimeDb::new(true);
        let mut states = db.connection_states();
        assert_eq!(states.next().await, Some(true));

        db.set_connected(false);
        assert_eq!(states.next().await, Some(false));
    }

    #[tokio::test]
    async fn test_memory_writes_fail_offline() {
        let db = MemoryRealtimeDb::new(false);
        assert!(db.set("connection-test/1", json!({"timestamp": 1})).await.is_err());

        db.set_connected(true);
        db.set("client-status/u1", json!({"online": true})).await.unwrap();
        assert_eq!(db.value("client-status/u1").await, Some(json!({"online": true})));
        assert_eq!(db.write_count(), 2);
    }

    #[test]
    fn test_rest_paths() {
        let config = FirebaseConfig {
            project_id: "reality-sk".into(),
            database_url: Some("https://reality-sk.europe-west1.firebasedatabase.app/".into()),
            ..Default::default()
        };
        let db = RestRealtimeDb::new(&config).unwrap();
        assert_eq!(
            db.path_url("/client-status/u1"),
            "https://reality-sk.europe-west1.firebasedatabase.app/client-status/u1.json"
        );
    }
}
