//! Auth session
//!
//! [`AuthSession`] follows the backend's auth state, mirrors it into the
//! `auth-token` cookie the server side uses as a navigation hint, and wraps
//! the form operations with the loading/error bookkeeping the pages show.

use crate::auth::auth::AuthBackend;
use crate::auth::types::{ProfileChanges, User};
use crate::error::FirebaseError;
use crate::repository::UserRepository;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Name of the cookie marking a signed-in browser
pub const AUTH_COOKIE: &str = "auth-token";

/// Cookie lifetime
pub const AUTH_COOKIE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A cookie written by the session
///
/// Not a credential: it only tells server-side routing that a user is
/// probably signed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Path attribute
    pub path: String,
    /// Max-Age attribute
    pub max_age: Duration,
    /// HttpOnly attribute
    pub http_only: bool,
}

impl AuthCookie {
    /// `auth-token=true`, path `/`, seven days, readable by scripts
    pub fn signed_in() -> Self {
        Self {
            name: AUTH_COOKIE.to_string(),
            value: "true".to_string(),
            path: "/".to_string(),
            max_age: AUTH_COOKIE_MAX_AGE,
            http_only: false,
        }
    }

    /// Render as a `Set-Cookie` header value
    pub fn header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}; SameSite=Lax",
            self.name,
            self.value,
            self.path,
            self.max_age.as_secs()
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }

    /// `Set-Cookie` value that deletes a cookie named `name`
    pub fn removal_header_value(name: &str) -> String {
        format!("{}=; Path=/; Max-Age=0; SameSite=Lax", name)
    }
}

/// Where the session keeps its cookie
pub trait CookieStore: Send + Sync {
    /// Create or replace a cookie
    fn set(&self, cookie: AuthCookie);
    /// Delete a cookie by name
    fn remove(&self, name: &str);
    /// Read a cookie by name
    fn get(&self, name: &str) -> Option<AuthCookie>;
}

/// In-process [`CookieStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieStore {
    cookies: Arc<Mutex<HashMap<String, AuthCookie>>>,
}

impl MemoryCookieStore {
    /// Create an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    fn jar(&self) -> std::sync::MutexGuard<'_, HashMap<String, AuthCookie>> {
        match self.cookies.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CookieStore for MemoryCookieStore {
    fn set(&self, cookie: AuthCookie) {
        self.jar().insert(cookie.name.clone(), cookie);
    }

    fn remove(&self, name: &str) {
        self.jar().remove(name);
    }

    fn get(&self, name: &str) -> Option<AuthCookie> {
        self.jar().get(name).cloned()
    }
}

/// Who is signed in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// First auth event not seen yet
    #[default]
    Loading,
    /// A user is signed in
    Authenticated(Arc<User>),
    /// Nobody is signed in
    Unauthenticated,
}

/// Observable session state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Current auth state
    pub auth: AuthState,
    /// A form operation is in flight
    pub loading: bool,
    /// User-facing message from the last failed operation
    pub error: Option<String>,
}

impl SessionState {
    /// Signed-in user, if any
    pub fn user(&self) -> Option<&Arc<User>> {
        match &self.auth {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// True while waiting for the first auth event or an operation
    pub fn is_loading(&self) -> bool {
        self.loading || self.auth == AuthState::Loading
    }
}

/// Session over an [`AuthBackend`]
pub struct AuthSession {
    inner: Arc<SessionInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct SessionInner {
    backend: Arc<dyn AuthBackend>,
    cookies: Arc<dyn CookieStore>,
    users: Option<UserRepository>,
    state_tx: watch::Sender<SessionState>,
}

impl AuthSession {
    /// Create a session; call [`start`](Self::start) to follow the backend
    pub fn new(backend: Arc<dyn AuthBackend>, cookies: Arc<dyn CookieStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                cookies,
                users: None,
                state_tx,
            }),
            task: Mutex::new(None),
        }
    }

    /// Also create `users/{uid}` profiles on sign-up
    pub fn with_profiles(backend: Arc<dyn AuthBackend>, cookies: Arc<dyn CookieStore>, users: UserRepository) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner {
                backend,
                cookies,
                users: Some(users),
                state_tx,
            }),
            task: Mutex::new(None),
        }
    }

    /// Follow the backend's auth state changes; calling again is a no-op
    pub fn start(&self) {
        let mut task = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let mut changes = inner.backend.state_changes().await;
            while let Some(user) = changes.next().await {
                inner.apply_user(user);
            }
        }));
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Signed-in user, if any
    pub fn current_user(&self) -> Option<Arc<User>> {
        self.state().user().cloned()
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        self.inner.begin();
        let result = self.inner.backend.sign_in(email, password).await;
        if let Ok(user) = &result {
            self.inner.apply_user(Some(Arc::clone(user)));
        }
        self.inner.finish(result)
    }

    /// Create an account, sign it in, and create its profile document
    ///
    /// A failed profile write is logged; the account itself exists.
    pub async fn sign_up(&self, email: &str, password: &str, name: Option<String>) -> Result<Arc<User>, FirebaseError> {
        self.inner.begin();
        let result = self.inner.backend.sign_up(email, password).await;
        if let Ok(user) = &result {
            self.inner.apply_user(Some(Arc::clone(user)));
            if let Some(users) = &self.inner.users {
                let email = user.email.clone().unwrap_or_else(|| email.trim().to_string());
                if let Err(e) = users.create_profile(&user.uid, &email, name).await {
                    tracing::warn!(uid = %user.uid, "failed to create user profile: {}", e);
                }
            }
        }
        self.inner.finish(result)
    }

    /// Send a password reset email
    pub async fn reset_password(&self, email: &str) -> Result<(), FirebaseError> {
        self.inner.begin();
        let result = self.inner.backend.send_password_reset(email).await;
        self.inner.finish(result)
    }

    /// Sign out
    pub async fn sign_out(&self) -> Result<(), FirebaseError> {
        self.inner.begin();
        let result = self.inner.backend.sign_out().await;
        if result.is_ok() {
            self.inner.apply_user(None);
        }
        self.inner.finish(result)
    }

    /// Change display name and/or photo URL
    pub async fn update_profile(&self, changes: ProfileChanges) -> Result<Arc<User>, FirebaseError> {
        self.inner.begin();
        let result = self.inner.backend.update_profile(changes).await;
        if let Ok(user) = &result {
            self.inner.apply_user(Some(Arc::clone(user)));
        }
        self.inner.finish(result)
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        let handle = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl SessionInner {
    fn begin(&self) {
        self.state_tx.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
    }

    fn finish<T>(&self, result: Result<T, FirebaseError>) -> Result<T, FirebaseError> {
        let error = match &result {
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(code = %e.code(), "auth operation failed: {}", e);
                Some(e.user_message())
            }
        };
        self.state_tx.send_modify(|state| {
            state.loading = false;
            state.error = error;
        });
        result
    }

    fn apply_user(&self, user: Option<Arc<User>>) {
        match &user {
            Some(_) => self.cookies.set(AuthCookie::signed_in()),
            None => self.cookies.remove(AUTH_COOKIE),
        }
        let auth = match user {
            Some(user) => AuthState::Authenticated(user),
            None => AuthState::Unauthenticated,
        };
        self.state_tx.send_if_modified(|state| {
            if state.auth == auth {
                return false;
            }
            state.auth = auth;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuth;
    use crate::error::AuthError;
    use crate::firestore::{collections, MemoryStore};

    fn session() -> (MemoryAuth, MemoryCookieStore, AuthSession) {
        let auth = MemoryAuth::new();
        let cookies = MemoryCookieStore::new();
        let session = AuthSession::new(Arc::new(auth.clone()), Arc::new(cookies.clone()));
        (auth, cookies, session)
    }

    #[test]
    fn test_cookie_header() {
        assert_eq!(
            AuthCookie::signed_in().header_value(),
            "auth-token=true; Path=/; Max-Age=604800; SameSite=Lax"
        );
        assert_eq!(
            AuthCookie::removal_header_value(AUTH_COOKIE),
            "auth-token=; Path=/; Max-Age=0; SameSite=Lax"
        );
    }

    #[tokio::test]
    async fn test_auth_events_drive_cookie() {
        let (auth, cookies, session) = session();
        let mut rx = session.subscribe();
        session.start();

        rx.wait_for(|s| s.auth == AuthState::Unauthenticated).await.unwrap();
        assert!(cookies.get(AUTH_COOKIE).is_none());

        // Sign in straight on the backend; the session only sees the event
        auth.sign_up("jana@example.sk", "heslo123").await.unwrap();
        rx.wait_for(|s| s.user().is_some()).await.unwrap();
        let cookie = cookies.get(AUTH_COOKIE).unwrap();
        assert_eq!(cookie.value, "true");
        assert!(!cookie.http_only);

        auth.sign_out().await.unwrap();
        rx.wait_for(|s| s.auth == AuthState::Unauthenticated).await.unwrap();
        assert!(cookies.get(AUTH_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_failed_sign_in_stores_message() {
        let (auth, cookies, session) = session();
        auth.sign_up("jana@example.sk", "heslo123").await.unwrap();
        auth.sign_out().await.unwrap();

        let err = session.sign_in("jana@example.sk", "zle-heslo").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidLoginCredentials)));
        let state = session.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Email or password is incorrect"));
        assert!(cookies.get(AUTH_COOKIE).is_none());

        session.sign_in("jana@example.sk", "heslo123").await.unwrap();
        let state = session.state();
        assert!(state.error.is_none());
        assert!(state.user().is_some());
        assert!(cookies.get(AUTH_COOKIE).is_some());
    }

    #[tokio::test]
    async fn test_operations_make_one_backend_call() {
        let (auth, _, session) = session();
        auth.fail_next(AuthError::NetworkRequestFailed("offline".into())).await;
        assert!(session.reset_password("jana@example.sk").await.is_err());
        assert_eq!(auth.call_count(), 1);
        assert!(session.state().error.is_some());
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile() {
        let store = MemoryStore::new();
        let users = UserRepository::new(Arc::new(store.clone()));
        let session = AuthSession::with_profiles(
            Arc::new(MemoryAuth::new()),
            Arc::new(MemoryCookieStore::new()),
            users.clone(),
        );

        let user = session
            .sign_up("peter@example.sk", "heslo123", Some("Peter".into()))
            .await
            .unwrap();
        let profile = users.get_profile(&user.uid).await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Peter"));
        assert_eq!(store.len(collections::USERS).await, 1);

        session
            .update_profile(ProfileChanges::with_display_name("Peter K."))
            .await
            .unwrap();
        assert_eq!(
            session.current_user().unwrap().display_name.as_deref(),
            Some("Peter K.")
        );

        session.sign_out().await.unwrap();
        assert!(session.current_user().is_none());
    }
}
