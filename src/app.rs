//! Firebase app and service initialization
//!
//! [`FirebaseApp`] is built once from a [`FirebaseConfig`] and a
//! [`ServiceFactory`], then cloned into whatever needs Firebase. Services
//! start lazily on the first [`FirebaseApp::wait_for_init`] (or any accessor)
//! and every caller shares that one attempt. Operations issued while
//! initialization is running simply await it; if it failed, they fail with
//! the same [`InitError`]. A failed app stays failed.

use crate::analytics::Analytics;
use crate::auth::{AuthBackend, RestAuth};
use crate::config::FirebaseConfig;
use crate::connection::ConnectionMonitor;
use crate::error::{FirebaseError, InitError};
use crate::firestore::{DocumentStore, RestFirestore, RetryingStore};
use crate::realtime::{RealtimeDatabase, RestRealtimeDb};
use crate::repository::{FavoriteRepository, MessageRepository, PropertyRepository, UserRepository};
use crate::storage::{ObjectStorage, RestStorage};
use async_trait::async_trait;
use futures::StreamExt;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OnceCell;

/// Lifecycle of an app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    /// Nothing has asked for a service yet
    Uninitialized,
    /// Initialization is running
    Initializing,
    /// Initialization finished; individual services may still be absent
    Initialized,
    /// Initialization failed for good
    Failed(String),
}

/// Services that started successfully
#[derive(Default)]
pub struct Services {
    /// Authentication
    pub auth: Option<Arc<dyn AuthBackend>>,
    /// Cloud Firestore
    pub firestore: Option<Arc<dyn DocumentStore>>,
    /// Cloud Storage
    pub storage: Option<Arc<dyn ObjectStorage>>,
    /// Realtime Database
    pub realtime: Option<Arc<dyn RealtimeDatabase>>,
    /// Analytics, present only with a measurement ID
    pub analytics: Option<Analytics>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("auth", &self.auth.is_some())
            .field("firestore", &self.firestore.is_some())
            .field("storage", &self.storage.is_some())
            .field("realtime", &self.realtime.is_some())
            .field("analytics", &self.analytics)
            .finish()
    }
}

impl Services {
    /// Authentication, or `ServiceUnavailable`
    pub fn auth(&self) -> Result<Arc<dyn AuthBackend>, InitError> {
        self.auth.clone().ok_or(InitError::ServiceUnavailable("auth"))
    }

    /// Firestore, or `ServiceUnavailable`
    pub fn firestore(&self) -> Result<Arc<dyn DocumentStore>, InitError> {
        self.firestore.clone().ok_or(InitError::ServiceUnavailable("firestore"))
    }

    /// Storage, or `ServiceUnavailable`
    pub fn storage(&self) -> Result<Arc<dyn ObjectStorage>, InitError> {
        self.storage.clone().ok_or(InitError::ServiceUnavailable("storage"))
    }

    /// Realtime Database, or `ServiceUnavailable`
    pub fn realtime(&self) -> Result<Arc<dyn RealtimeDatabase>, InitError> {
        self.realtime.clone().ok_or(InitError::ServiceUnavailable("database"))
    }

    /// Names of the services that started
    pub fn available(&self) -> Vec<&'static str> {
        [
            ("auth", self.auth.is_some()),
            ("firestore", self.firestore.is_some()),
            ("storage", self.storage.is_some()),
            ("database", self.realtime.is_some()),
            ("analytics", self.analytics.is_some()),
        ]
        .into_iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Builds the app and each service
///
/// `create_app` failing fails the whole app; a failing service is logged and
/// left out while the others still start.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    /// Register the app with the project
    async fn create_app(&self, config: &FirebaseConfig) -> Result<(), FirebaseError>;

    /// Start authentication
    async fn auth(&self, config: &FirebaseConfig) -> Result<Arc<dyn AuthBackend>, FirebaseError>;

    /// Start Firestore
    async fn firestore(&self, config: &FirebaseConfig) -> Result<Arc<dyn DocumentStore>, FirebaseError>;

    /// Start Storage
    async fn storage(&self, config: &FirebaseConfig) -> Result<Arc<dyn ObjectStorage>, FirebaseError>;

    /// Start the Realtime Database
    async fn realtime(&self, config: &FirebaseConfig) -> Result<Arc<dyn RealtimeDatabase>, FirebaseError>;

    /// Start Analytics; `Ok(None)` when it is not configured
    async fn analytics(&self, config: &FirebaseConfig) -> Result<Option<Analytics>, FirebaseError> {
        Ok(Analytics::new(config))
    }
}

/// Firebase app handle
#[derive(Clone)]
pub struct FirebaseApp {
    inner: Arc<AppInner>,
}

struct AppInner {
    config: FirebaseConfig,
    factory: Arc<dyn ServiceFactory>,
    state: RwLock<InitState>,
    ready: OnceCell<Result<Arc<Services>, InitError>>,
}

impl FirebaseApp {
    /// Create an app; nothing is started until first use
    pub fn new(config: FirebaseConfig, factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                config,
                factory,
                state: RwLock::new(InitState::Uninitialized),
                ready: OnceCell::new(),
            }),
        }
    }

    /// App backed by the REST clients
    pub fn with_default_services(config: FirebaseConfig) -> Self {
        Self::new(config, Arc::new(DefaultServiceFactory::new()))
    }

    /// Configuration the app was built with
    pub fn config(&self) -> &FirebaseConfig {
        &self.inner.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> InitState {
        match self.inner.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Start the services if not started yet; idempotent
    pub async fn initialize(&self) -> Result<(), InitError> {
        self.wait_for_init().await.map(|_| ())
    }

    /// Wait for the one shared initialization attempt
    pub async fn wait_for_init(&self) -> Result<Arc<Services>, InitError> {
        self.inner
            .ready
            .get_or_init(|| self.inner.initialize())
            .await
            .clone()
    }

    /// Run `op` once the services are ready
    ///
    /// Fails with the initialization error without calling `op` if the app
    /// could not start.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, FirebaseError>
    where
        F: FnOnce(Arc<Services>) -> Fut,
        Fut: Future<Output = Result<T, FirebaseError>>,
    {
        let services = self.wait_for_init().await?;
        op(services).await
    }

    /// Authentication
    pub async fn auth(&self) -> Result<Arc<dyn AuthBackend>, FirebaseError> {
        Ok(self.wait_for_init().await?.auth()?)
    }

    /// Firestore
    pub async fn firestore(&self) -> Result<Arc<dyn DocumentStore>, FirebaseError> {
        Ok(self.wait_for_init().await?.firestore()?)
    }

    /// Storage
    pub async fn storage(&self) -> Result<Arc<dyn ObjectStorage>, FirebaseError> {
        Ok(self.wait_for_init().await?.storage()?)
    }

    /// Realtime Database
    pub async fn realtime(&self) -> Result<Arc<dyn RealtimeDatabase>, FirebaseError> {
        Ok(self.wait_for_init().await?.realtime()?)
    }

    /// Analytics, if configured and started
    pub async fn analytics(&self) -> Option<Analytics> {
        self.wait_for_init().await.ok()?.analytics.clone()
    }

    /// Listing repository, with image storage when Storage started
    pub async fn properties(&self) -> Result<PropertyRepository, FirebaseError> {
        let services = self.wait_for_init().await?;
        let repo = PropertyRepository::new(services.firestore()?);
        Ok(match services.storage.clone() {
            Some(storage) => repo.with_storage(storage),
            None => repo,
        })
    }

    /// Profile and settings repository
    pub async fn users(&self) -> Result<UserRepository, FirebaseError> {
        Ok(UserRepository::new(self.firestore().await?))
    }

    /// Message repository
    pub async fn messages(&self) -> Result<MessageRepository, FirebaseError> {
        Ok(MessageRepository::new(self.firestore().await?))
    }

    /// Favorite repository
    pub async fn favorites(&self) -> Result<FavoriteRepository, FirebaseError> {
        Ok(FavoriteRepository::new(self.firestore().await?))
    }

    /// Connection monitor over the Realtime Database (not started)
    pub async fn connection_monitor(&self) -> Result<ConnectionMonitor, FirebaseError> {
        Ok(ConnectionMonitor::new(self.realtime().await?))
    }
}

impl std::fmt::Debug for FirebaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseApp")
            .field("project_id", &self.inner.config.project_id)
            .field("state", &self.state())
            .finish()
    }
}

impl AppInner {
    fn set_state(&self, state: InitState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    async fn initialize(&self) -> Result<Arc<Services>, InitError> {
        self.set_state(InitState::Initializing);
        match self.start_services().await {
            Ok(services) => {
                tracing::info!(
                    project_id = %self.config.project_id,
                    services = ?services.available(),
                    "firebase initialized"
                );
                self.set_state(InitState::Initialized);
                Ok(Arc::new(services))
            }
            Err(e) => {
                tracing::error!("firebase initialization failed: {}", e);
                self.set_state(InitState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn start_services(&self) -> Result<Services, InitError> {
        // Validate config (error case first)
        let missing = self.config.missing_keys();
        if !missing.is_empty() {
            return Err(InitError::NotConfigured(missing.join(", ")));
        }

        self.factory
            .create_app(&self.config)
            .await
            .map_err(|e| InitError::Failed(e.to_string()))?;

        let config = &self.config;
        Ok(Services {
            auth: optional("auth", self.factory.auth(config).await),
            firestore: optional("firestore", self.factory.firestore(config).await),
            storage: optional("storage", self.factory.storage(config).await),
            realtime: optional("database", self.factory.realtime(config).await),
            analytics: optional("analytics", self.factory.analytics(config).await).flatten(),
        })
    }
}

fn optional<T>(service: &str, result: Result<T, FirebaseError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(service, code = %e.code(), "service failed to start: {}", e);
            None
        }
    }
}

/// Builds the REST clients
///
/// Firestore is wrapped in a [`RetryingStore`]. The signed-in user's ID
/// token is pushed to Firestore, Storage and the Realtime Database whenever
/// the auth state changes.
#[derive(Default)]
pub struct DefaultServiceFactory {
    tokens: Arc<TokenTargets>,
}

#[derive(Default)]
struct TokenTargets {
    firestore: Mutex<Option<RestFirestore>>,
    storage: Mutex<Option<RestStorage>>,
    realtime: Mutex<Option<RestRealtimeDb>>,
}

impl TokenTargets {
    fn snapshot(&self) -> (Option<RestFirestore>, Option<RestStorage>, Option<RestRealtimeDb>) {
        fn take<T: Clone>(slot: &Mutex<Option<T>>) -> Option<T> {
            match slot.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }
        (take(&self.firestore), take(&self.storage), take(&self.realtime))
    }

    async fn apply(&self, token: Option<String>) {
        let (firestore, storage, realtime) = self.snapshot();
        if let Some(client) = firestore {
            client.set_id_token(token.clone()).await;
        }
        if let Some(client) = storage {
            client.set_id_token(token.clone()).await;
        }
        if let Some(client) = realtime {
            client.set_id_token(token).await;
        }
    }
}

fn store_slot<T>(slot: &Mutex<Option<T>>, value: T) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

impl DefaultServiceFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceFactory for DefaultServiceFactory {
    async fn create_app(&self, config: &FirebaseConfig) -> Result<(), FirebaseError> {
        if config.project_id.trim().is_empty() {
            return Err(FirebaseError::Config("Project ID cannot be empty".to_string()));
        }
        if config.emulators.is_some() {
            tracing::info!("using local Firebase emulators");
        }
        tracing::debug!(
            project_id = %config.project_id,
            environment = ?config.environment,
            "firebase app created"
        );
        Ok(())
    }

    async fn auth(&self, config: &FirebaseConfig) -> Result<Arc<dyn AuthBackend>, FirebaseError> {
        let auth = RestAuth::new(config)?;

        let targets = Arc::clone(&self.tokens);
        let mut changes = auth.state_changes().await;
        tokio::spawn(async move {
            while let Some(user) = changes.next().await {
                let token = user.and_then(|u| u.id_token().map(str::to_string));
                targets.apply(token).await;
            }
        });

        Ok(Arc::new(auth))
    }

    async fn firestore(&self, config: &FirebaseConfig) -> Result<Arc<dyn DocumentStore>, FirebaseError> {
        let client = RestFirestore::new(config)?;
        store_slot(&self.tokens.firestore, client.clone());
        Ok(Arc::new(RetryingStore::new(Arc::new(client))))
    }

    async fn storage(&self, config: &FirebaseConfig) -> Result<Arc<dyn ObjectStorage>, FirebaseError> {
        let client = RestStorage::new(config)?;
        store_slot(&self.tokens.storage, client.clone());
        Ok(Arc::new(client))
    }

    async fn realtime(&self, config: &FirebaseConfig) -> Result<Arc<dyn RealtimeDatabase>, FirebaseError> {
        let client = RestRealtimeDb::new(config)?;
        store_slot(&self.tokens.realtime, client.clone());
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;
    use crate::firestore::MemoryStore;
    use crate::realtime::MemoryRealtimeDb;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeFactory {
        create_calls: AtomicUsize,
        fail_create: bool,
        fail_storage: bool,
    }

    #[async_trait]
    impl ServiceFactory for FakeFactory {
        async fn create_app(&self, _config: &FirebaseConfig) -> Result<(), FirebaseError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_create {
                return Err(FirebaseError::Config("bad app id".into()));
            }
            Ok(())
        }

        async fn auth(&self, _config: &FirebaseConfig) -> Result<Arc<dyn AuthBackend>, FirebaseError> {
            Ok(Arc::new(MemoryAuth::new()))
        }

        async fn firestore(&self, _config: &FirebaseConfig) -> Result<Arc<dyn DocumentStore>, FirebaseError> {
            Ok(Arc::new(MemoryStore::new()))
        }

        async fn storage(&self, _config: &FirebaseConfig) -> Result<Arc<dyn ObjectStorage>, FirebaseError> {
            if self.fail_storage {
                return Err(FirebaseError::Config("Storage bucket is not configured".into()));
            }
            Ok(Arc::new(MemoryStorage::new()))
        }

        async fn realtime(&self, _config: &FirebaseConfig) -> Result<Arc<dyn RealtimeDatabase>, FirebaseError> {
            Ok(Arc::new(MemoryRealtimeDb::new(true)))
        }
    }

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "AIzaTestKey".into(),
            project_id: "reality-test".into(),
            app_id: "1:123:web:abc".into(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_share_one_attempt() {
        let factory = Arc::new(FakeFactory::default());
        let app = FirebaseApp::new(config(), factory.clone());
        assert_eq!(app.state(), InitState::Uninitialized);

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move { app.wait_for_init().await.is_ok() })
            })
            .collect();
        for waiter in futures::future::join_all(waiters).await {
            assert!(waiter.unwrap());
        }

        assert_eq!(factory.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(app.state(), InitState::Initialized);
        app.initialize().await.unwrap();
        assert_eq!(factory.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_terminal() {
        let factory = Arc::new(FakeFactory {
            fail_create: true,
            ..Default::default()
        });
        let app = FirebaseApp::new(config(), factory.clone());

        let err = app.wait_for_init().await.unwrap_err();
        assert!(matches!(err, InitError::Failed(_)));
        assert!(matches!(app.state(), InitState::Failed(_)));

        let ran = AtomicUsize::new(0);
        let result = app
            .run(|_| async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(FirebaseError::Init(InitError::Failed(_)))));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(factory.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_config_never_calls_factory() {
        let factory = Arc::new(FakeFactory::default());
        let app = FirebaseApp::new(FirebaseConfig::default(), factory.clone());
        let err = app.initialize().await.unwrap_err();
        assert!(matches!(err, InitError::NotConfigured(_)));
        assert_eq!(factory.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_service_does_not_block_others() {
        let factory = Arc::new(FakeFactory {
            fail_storage: true,
            ..Default::default()
        });
        let app = FirebaseApp::new(config(), factory);

        assert!(app.firestore().await.is_ok());
        assert!(app.auth().await.is_ok());
        let err = app.storage().await.err().unwrap();
        assert!(matches!(err, FirebaseError::Init(InitError::ServiceUnavailable("storage"))));
        assert!(app.analytics().await.is_none());

        // Listings still work, just without image uploads
        let properties = app.properties().await.unwrap();
        assert!(properties.get_all_properties_checked().await.properties.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_readiness() {
        let app = FirebaseApp::new(config(), Arc::new(FakeFactory::default()));
        let count = app
            .run(|services| async move {
                let store = services.firestore()?;
                store.add("properties", Default::default()).await?;
                Ok(services.available().len())
            })
            .await
            .unwrap();
        assert_eq!(count, 4);
    }
}
