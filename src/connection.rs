//! Connection monitor
//!
//! Subscribes once to `.info/connected` and fans status changes out to
//! listeners. When the connection drops it probes the database by writing
//! `connection-test/{timestamp}`, backing off exponentially (capped at 30s)
//! for at most five attempts, then gives up until the next connection event.

use crate::error::FirebaseError;
use crate::realtime::RealtimeDatabase;
use futures::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Connection status broadcast to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Connected to the database
    Connected,
    /// Connection lost
    Disconnected,
    /// About to make reconnect probe `attempt` (1-based)
    Reconnecting {
        /// Attempt number
        attempt: u32,
    },
    /// All reconnect probes failed; nothing further is scheduled
    GaveUp,
}

/// Reconnect probing schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum number of probes per disconnect
    pub max_attempts: u32,
    /// Delay before the first probe
    pub base_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before probe `attempt` (1-based)
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1_u32 << shift)
            .min(self.max_delay)
    }
}

/// Watches the Realtime Database connection
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct MonitorInner {
    database: Arc<dyn RealtimeDatabase>,
    policy: ReconnectPolicy,
    status_tx: broadcast::Sender<ConnectionStatus>,
    connected: AtomicBool,
    probes: AtomicU32,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ConnectionMonitor {
    /// Create a monitor with the default reconnect policy; call [`start`](Self::start)
    pub fn new(database: Arc<dyn RealtimeDatabase>) -> Self {
        Self::with_policy(database, ReconnectPolicy::default())
    }

    /// Create a monitor with an explicit reconnect policy
    pub fn with_policy(database: Arc<dyn RealtimeDatabase>, policy: ReconnectPolicy) -> Self {
        let (status_tx, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(MonitorInner {
                database,
                policy,
                status_tx,
                connected: AtomicBool::new(false),
                probes: AtomicU32::new(0),
                reconnect: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to `.info/connected`; calling again while running is a no-op
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(watch_connection(inner)));
        tracing::debug!("connection monitor started");
    }

    /// Stop watching and cancel any pending reconnect probes
    pub fn stop(&self) {
        let handle = lock(&self.task).take();
        if let Some(handle) = &handle {
            handle.abort();
        }
        self.inner.cancel_reconnect();
        if handle.is_some() {
            tracing::debug!("connection monitor stopped");
        }
    }

    /// Listen for status changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Last known connection state
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Number of probes written so far, manual ones included
    pub fn probe_count(&self) -> u32 {
        self.inner.probes.load(Ordering::SeqCst)
    }

    /// Probe the database once, right now
    ///
    /// Returns whether the probe write succeeded; on success the monitor is
    /// marked connected.
    pub async fn reconnect(&self) -> bool {
        match self.inner.probe().await {
            Ok(()) => {
                self.inner.mark_connected();
                true
            }
            Err(e) => {
                tracing::warn!("manual reconnect probe failed: {}", e);
                false
            }
        }
    }

    /// Record a user's presence at `client-status/{userId}`
    pub async fn set_client_status(&self, user_id: &str, online: bool) -> Result<(), FirebaseError> {
        let path = format!("client-status/{}", user_id);
        self.inner
            .database
            .set(
                &path,
                json!({
                    "online": online,
                    "lastChanged": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl MonitorInner {
    fn emit(&self, status: ConnectionStatus) {
        // No listeners is fine
        let _ = self.status_tx.send(status);
    }

    fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::info!("realtime database connected");
            self.emit(ConnectionStatus::Connected);
        }
    }

    fn cancel_reconnect(&self) {
        if let Some(task) = lock(&self.reconnect).take() {
            task.abort();
        }
    }

    fn ensure_reconnecting(self: &Arc<Self>) {
        let mut reconnect = lock(&self.reconnect);
        if reconnect.as_ref().map_or(true, |t| t.is_finished()) {
            *reconnect = Some(tokio::spawn(reconnect_loop(Arc::clone(self))));
        }
    }

    async fn probe(&self) -> Result<(), FirebaseError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.database
            .set(
                &format!("connection-test/{}", timestamp),
                json!({ "timestamp": timestamp }),
            )
            .await
    }
}

async fn watch_connection(inner: Arc<MonitorInner>) {
    let mut states = inner.database.connection_states();

    while let Some(connected) = states.next().await {
        if connected {
            inner.cancel_reconnect();
            inner.mark_connected();
            continue;
        }

        let was_connected = inner.connected.swap(false, Ordering::SeqCst);
        if was_connected {
            tracing::warn!("realtime database disconnected");
        }
        inner.emit(ConnectionStatus::Disconnected);

        inner.ensure_reconnecting();
    }

    inner.cancel_reconnect();
    tracing::debug!("connection state stream ended");
}

async fn reconnect_loop(inner: Arc<MonitorInner>) {
    let policy = inner.policy;
    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_before_attempt(attempt);
        inner.emit(ConnectionStatus::Reconnecting { attempt });
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect probe");
        tokio::time::sleep(delay).await;

        if inner.connected.load(Ordering::SeqCst) {
            return;
        }
        match inner.probe().await {
            Ok(()) => {
                inner.mark_connected();
                return;
            }
            Err(e) => tracing::warn!(attempt, "reconnect probe failed: {}", e),
        }
    }

    tracing::error!(
        attempts = policy.max_attempts,
        "giving up on reconnecting to the realtime database"
    );
    inner.emit(ConnectionStatus::GaveUp);
}
