//! Firebase Authentication
//!
//! [`AuthBackend`] is the seam the session layer talks to. [`RestAuth`] is
//! the Identity Toolkit REST client; the in-memory fake lives in
//! [`super::memory`].

use crate::auth::types::{jwt_expiration, ProfileChanges, User};
use crate::config::FirebaseConfig;
use crate::error::{AuthError, FirebaseError};
use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const IDENTITY_TOOLKIT_HOST: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_HOST: &str = "https://securetoken.googleapis.com";

/// Stream of auth states: the current user first, then every change
pub type AuthStateStream = Pin<Box<dyn Stream<Item = Option<Arc<User>>> + Send>>;

/// Email/password authentication operations
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Sign in an existing account
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError>;

    /// Create an account and sign it in
    async fn sign_up(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError>;

    /// Send a password reset email
    async fn send_password_reset(&self, email: &str) -> Result<(), FirebaseError>;

    /// Sign out; always clears the current user
    async fn sign_out(&self) -> Result<(), FirebaseError>;

    /// Update the signed-in user's display name and/or photo URL
    async fn update_profile(&self, changes: ProfileChanges) -> Result<Arc<User>, FirebaseError>;

    /// Currently signed-in user
    async fn current_user(&self) -> Option<Arc<User>>;

    /// Subscribe to auth state changes
    async fn state_changes(&self) -> AuthStateStream;
}

/// Current user plus a broadcast of changes, shared by the backends
pub(crate) struct UserState {
    current_user: RwLock<Option<Arc<User>>>,
    state_tx: broadcast::Sender<Option<Arc<User>>>,
}

impl UserState {
    pub(crate) fn new() -> Self {
        let (state_tx, _) = broadcast::channel(16);
        Self {
            current_user: RwLock::new(None),
            state_tx,
        }
    }

    pub(crate) async fn current(&self) -> Option<Arc<User>> {
        self.current_user.read().await.clone()
    }

    pub(crate) async fn set(&self, user: Option<Arc<User>>) {
        let mut current = self.current_user.write().await;
        *current = user.clone();

        // No listeners is fine
        let _ = self.state_tx.send(user);
    }

    pub(crate) async fn changes(&self) -> AuthStateStream {
        // Subscribe before reading so a change in between is not lost
        let mut rx = self.state_tx.subscribe();
        let initial_user = self.current().await;

        Box::pin(stream! {
            yield initial_user;

            loop {
                match rx.recv().await {
                    Ok(user) => yield user,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "auth state listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Firebase Auth over the Identity Toolkit REST API
#[derive(Clone)]
pub struct RestAuth {
    inner: Arc<RestAuthInner>,
}

struct RestAuthInner {
    api_key: String,
    identity_url: String,
    token_url: String,
    http_client: reqwest::Client,
    state: UserState,
}

impl RestAuth {
    /// Create a client for the configured project
    ///
    /// With emulators configured, requests go to the auth emulator.
    pub fn new(config: &FirebaseConfig) -> Result<Self, FirebaseError> {
        // Validate API key (error case first)
        if config.api_key.is_empty() {
            return Err(AuthError::InvalidApiKey.into());
        }

        let (identity_host, token_host) = match &config.emulators {
            Some(emulators) => (
                format!("{}/identitytoolkit.googleapis.com", emulators.auth_url()),
                format!("{}/securetoken.googleapis.com", emulators.auth_url()),
            ),
            None => (
                IDENTITY_TOOLKIT_HOST.to_string(),
                SECURE_TOKEN_HOST.to_string(),
            ),
        };

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FirebaseError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestAuthInner {
                api_key: config.api_key.clone(),
                identity_url: format!("{}/v1", identity_host),
                token_url: format!("{}/v1/token", token_host),
                http_client,
                state: UserState::new(),
            }),
        })
    }

    fn accounts_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.inner.identity_url, method, self.inner.api_key
        )
    }

    async fn post(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value, FirebaseError> {
        let response = self
            .inner
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::NetworkRequestFailed(e.to_string()))?;

        // Handle error responses first
        if !response.status().is_success() {
            let error_body: serde_json::Value = response.json().await.unwrap_or_default();
            let error_message = error_body["error"]["message"]
                .as_str()
                .unwrap_or("UNKNOWN_ERROR");
            return Err(AuthError::from_error_code(error_message).into());
        }

        Ok(response.json().await?)
    }

    async fn password_request(&self, method: &str, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        // Validate email (error case first)
        if email.trim().is_empty() {
            return Err(AuthError::InvalidEmail.into());
        }
        if password.is_empty() {
            return Err(AuthError::InvalidPassword.into());
        }

        let body = self
            .post(
                self.accounts_url(method),
                serde_json::json!({
                    "email": email.trim(),
                    "password": password,
                    "returnSecureToken": true
                }),
            )
            .await?;
        let response: SignInResponse = serde_json::from_value(body)?;
        let user = Arc::new(response.into_user());

        tracing::info!(uid = %user.uid, method, "signed in");
        self.inner.state.set(Some(Arc::clone(&user))).await;
        Ok(user)
    }

    /// ID token for the current user, refreshed if it expires within five minutes
    pub async fn fresh_id_token(&self) -> Result<String, FirebaseError> {
        let Some(user) = self.inner.state.current().await else {
            return Err(AuthError::NoSignedInUser.into());
        };
        let now = chrono::Utc::now().timestamp();
        if !user.token_needs_refresh(now) {
            if let Some(token) = user.id_token() {
                return Ok(token.to_string());
            }
        }

        let Some(refresh_token) = user.refresh_token.clone() else {
            return Err(AuthError::UserTokenExpired.into());
        };
        let body = self
            .post(
                format!("{}?key={}", self.inner.token_url, self.inner.api_key),
                serde_json::json!({
                    "grant_type": "refresh_token",
                    "refresh_token": refresh_token
                }),
            )
            .await?;
        let response: RefreshResponse = serde_json::from_value(body)?;

        let mut refreshed = User::clone(&user).with_id_token(response.id_token.clone());
        refreshed.refresh_token = Some(response.refresh_token);
        if refreshed.token_expiration.is_none() {
            refreshed.token_expiration = expiry_from_now(response.expires_in.as_deref());
        }
        tracing::debug!(uid = %refreshed.uid, "refreshed ID token");
        self.inner.state.set(Some(Arc::new(refreshed))).await;
        Ok(response.id_token)
    }
}

#[async_trait]
impl AuthBackend for RestAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        self.password_request("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        self.password_request("signUp", email, password).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), FirebaseError> {
        // Validate email (error case first)
        if email.trim().is_empty() {
            return Err(AuthError::InvalidEmail.into());
        }

        self.post(
            self.accounts_url("sendOobCode"),
            serde_json::json!({
                "requestType": "PASSWORD_RESET",
                "email": email.trim()
            }),
        )
        .await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), FirebaseError> {
        self.inner.state.set(None).await;
        Ok(())
    }

    async fn update_profile(&self, changes: ProfileChanges) -> Result<Arc<User>, FirebaseError> {
        let id_token = self.fresh_id_token().await?;
        let Some(current) = self.inner.state.current().await else {
            return Err(AuthError::NoSignedInUser.into());
        };

        // Build request body - only include fields that are provided
        let mut request_body = serde_json::json!({
            "idToken": id_token,
            "returnSecureToken": true
        });
        if let Some(display_name) = &changes.display_name {
            request_body["displayName"] = serde_json::json!(display_name);
        }
        if let Some(photo_url) = &changes.photo_url {
            request_body["photoUrl"] = serde_json::json!(photo_url);
        }

        let body = self.post(self.accounts_url("update"), request_body).await?;

        let mut updated = User::clone(&current);
        changes.apply(&mut updated);
        if let Some(token) = body["idToken"].as_str() {
            updated = updated.with_id_token(token);
        }
        if let Some(refresh) = body["refreshToken"].as_str() {
            updated.refresh_token = Some(refresh.to_string());
        }

        let updated = Arc::new(updated);
        self.inner.state.set(Some(Arc::clone(&updated))).await;
        Ok(updated)
    }

    async fn current_user(&self) -> Option<Arc<User>> {
        self.inner.state.current().await
    }

    async fn state_changes(&self) -> AuthStateStream {
        self.inner.state.changes().await
    }
}

impl std::fmt::Debug for RestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestAuth")
            .field("api_key", &"<redacted>")
            .field("identity_url", &self.inner.identity_url)
            .finish()
    }
}

/// `signInWithPassword` / `signUp` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

impl SignInResponse {
    fn into_user(self) -> User {
        let token_expiration = jwt_expiration(&self.id_token)
            .or_else(|| expiry_from_now(self.expires_in.as_deref()));

        User {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name.filter(|n| !n.is_empty()),
            photo_url: None,
            email_verified: false,
            id_token: Some(self.id_token),
            refresh_token: Some(self.refresh_token),
            token_expiration,
        }
    }
}

/// Secure token endpoint response
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

/// `expires_in` seconds from now; one hour when absent
fn expiry_from_now(expires_in: Option<&str>) -> Option<i64> {
    let seconds = match expires_in {
        Some(s) => s.parse::<i64>().ok()?,
        None => 3600,
    };
    Some(chrono::Utc::now().timestamp() + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "test-api-key".into(),
            project_id: "reality-test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_empty_api_key() {
        let err = RestAuth::new(&FirebaseConfig::default()).unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidApiKey)));
    }

    #[test]
    fn test_accounts_url() {
        let auth = RestAuth::new(&config()).unwrap();
        assert_eq!(
            auth.accounts_url("signInWithPassword"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=test-api-key"
        );

        let emulated = RestAuth::new(&FirebaseConfig {
            emulators: Some(Default::default()),
            ..config()
        })
        .unwrap();
        assert_eq!(
            emulated.accounts_url("signUp"),
            "http://localhost:9099/identitytoolkit.googleapis.com/v1/accounts:signUp?key=test-api-key"
        );
    }

    #[tokio::test]
    async fn test_sign_in_validates_input_before_network() {
        let auth = RestAuth::new(&config()).unwrap();
        let err = auth.sign_in("", "secret").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidEmail)));
        let err = auth.sign_up("user@example.com", "").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidPassword)));
        let err = auth.send_password_reset("  ").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidEmail)));
    }

    #[tokio::test]
    async fn test_update_profile_requires_user() {
        let auth = RestAuth::new(&config()).unwrap();
        let err = auth
            .update_profile(ProfileChanges::with_display_name("Jana"))
            .await
            .unwrap_err();
        assert!(err.requires_auth());
    }

    #[tokio::test]
    async fn test_state_changes_yield_current_then_updates() {
        let auth = RestAuth::new(&config()).unwrap();
        let mut stream = auth.state_changes().await;
        assert!(stream.next().await.unwrap().is_none());

        auth.inner
            .state
            .set(Some(Arc::new(User::new("u1", Some("a@b.sk".into())))))
            .await;
        assert_eq!(stream.next().await.unwrap().unwrap().uid, "u1");

        auth.sign_out().await.unwrap();
        assert!(stream.next().await.unwrap().is_none());
        assert!(auth.current_user().await.is_none());
    }

    #[test]
    fn test_sign_in_response_into_user() {
        let response: SignInResponse = serde_json::from_value(serde_json::json!({
            "localId": "abc",
            "email": "user@example.com",
            "displayName": "",
            "idToken": "opaque",
            "refreshToken": "refresh",
            "expiresIn": "3600",
            "registered": true
        }))
        .unwrap();
        let user = response.into_user();
        assert_eq!(user.uid, "abc");
        assert!(user.display_name.is_none());
        let now = chrono::Utc::now().timestamp();
        let exp = user.token_expiration().unwrap();
        assert!(exp > now + 3500 && exp <= now + 3600);
    }
}
