//! In-memory auth backend
//!
//! Accounts live in a map; errors use the same [`AuthError`] variants the
//! REST backend produces, so session and repository code can be exercised
//! without a Firebase project.

use crate::auth::auth::{AuthBackend, AuthStateStream, UserState};
use crate::auth::types::{ProfileChanges, User};
use crate::error::{AuthError, FirebaseError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// [`AuthBackend`] backed by an in-process account map
#[derive(Clone)]
pub struct MemoryAuth {
    inner: Arc<MemoryAuthInner>,
}

struct MemoryAuthInner {
    accounts: Mutex<HashMap<String, Account>>,
    failures: Mutex<Vec<AuthError>>,
    reset_requests: Mutex<Vec<String>>,
    calls: AtomicUsize,
    next_uid: AtomicUsize,
    state: UserState,
}

struct Account {
    password: String,
    user: User,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    /// Minimum password length, matching Firebase's `WEAK_PASSWORD` rule
    pub const MIN_PASSWORD_LEN: usize = 6;

    /// Create a backend with no accounts
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryAuthInner {
                accounts: Mutex::new(HashMap::new()),
                failures: Mutex::new(Vec::new()),
                reset_requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                next_uid: AtomicUsize::new(1),
                state: UserState::new(),
            }),
        }
    }

    /// Make the next call fail with `error`
    pub async fn fail_next(&self, error: AuthError) {
        self.inner.failures.lock().await.push(error);
    }

    /// Number of backend calls made, sign-out excluded
    pub fn call_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Emails a password reset was requested for
    pub async fn reset_requests(&self) -> Vec<String> {
        self.inner.reset_requests.lock().await.clone()
    }

    async fn begin_call(&self) -> Result<(), FirebaseError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match self.inner.failures.lock().await.pop() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn issue_token(uid: &str) -> String {
        use base64::Engine;
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let exp = chrono::Utc::now().timestamp() + 3600;
        let payload = engine.encode(format!(r#"{{"user_id":"{}","exp":{}}}"#, uid, exp));
        format!("{}.{}.", engine.encode(br#"{"alg":"none"}"#), payload)
    }
}

fn check_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[async_trait]
impl AuthBackend for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        self.begin_call().await?;
        let email = check_email(email)?;

        let user = {
            let accounts = self.inner.accounts.lock().await;
            match accounts.get(&email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(AuthError::InvalidLoginCredentials.into()),
            }
        };

        let token = Self::issue_token(&user.uid);
        let user = Arc::new(user.with_id_token(token));
        self.inner.state.set(Some(Arc::clone(&user))).await;
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Arc<User>, FirebaseError> {
        self.begin_call().await?;
        let email = check_email(email)?;
        if password.chars().count() < Self::MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidPassword.into());
        }

        let user = {
            let mut accounts = self.inner.accounts.lock().await;
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailAlreadyInUse.into());
            }
            let uid = format!("user-{}", self.inner.next_uid.fetch_add(1, Ordering::SeqCst));
            let user = User::new(uid, Some(email.clone()));
            accounts.insert(
                email,
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };

        let token = Self::issue_token(&user.uid);
        let user = Arc::new(user.with_id_token(token));
        self.inner.state.set(Some(Arc::clone(&user))).await;
        Ok(user)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), FirebaseError> {
        self.begin_call().await?;
        let email = check_email(email)?;
        // Unknown addresses succeed silently, like Firebase with enumeration protection
        self.inner.reset_requests.lock().await.push(email);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), FirebaseError> {
        self.inner.state.set(None).await;
        Ok(())
    }

    async fn update_profile(&self, changes: ProfileChanges) -> Result<Arc<User>, FirebaseError> {
        self.begin_call().await?;
        let Some(current) = self.inner.state.current().await else {
            return Err(AuthError::NoSignedInUser.into());
        };

        let mut updated = User::clone(&current);
        changes.apply(&mut updated);

        if let Some(email) = &updated.email {
            if let Some(account) = self.inner.accounts.lock().await.get_mut(email) {
                changes.apply(&mut account.user);
            }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let auth = MemoryAuth::new();
        let created = auth.sign_up("Jana@Example.sk", "heslo123").await.unwrap();
        assert_eq!(created.email.as_deref(), Some("jana@example.sk"));
        assert!(created.id_token().is_some());
        assert!(created.token_expiration().is_some());

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().await.is_none());

        let signed_in = auth.sign_in("jana@example.sk", "heslo123").await.unwrap();
        assert_eq!(signed_in.uid, created.uid);
    }

    #[tokio::test]
    async fn test_errors_match_firebase_codes() {
        let auth = MemoryAuth::new();
        auth.sign_up("jana@example.sk", "heslo123").await.unwrap();

        let err = auth.sign_up("jana@example.sk", "heslo123").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::EmailAlreadyInUse)));

        let err = auth.sign_up("peter@example.sk", "123").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidPassword)));

        let err = auth.sign_in("jana@example.sk", "wrong").await.unwrap_err();
        assert_eq!(err.user_message(), "Email or password is incorrect");

        let err = auth.sign_in("not-an-email", "x").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::InvalidEmail)));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let auth = MemoryAuth::new();
        auth.fail_next(AuthError::TooManyRequests).await;
        let err = auth.send_password_reset("jana@example.sk").await.unwrap_err();
        assert!(matches!(err, FirebaseError::Auth(AuthError::TooManyRequests)));

        auth.send_password_reset("jana@example.sk").await.unwrap();
        assert_eq!(auth.reset_requests().await, vec!["jana@example.sk".to_string()]);
        assert_eq!(auth.call_count(), 2);
    }

    #[tokio::test]
    async fn test_update_profile_persists_for_next_sign_in() {
        let auth = MemoryAuth::new();
        auth.sign_up("jana@example.sk", "heslo123").await.unwrap();
        let updated = auth
            .update_profile(ProfileChanges::with_display_name("Jana"))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Jana"));

        auth.sign_out().await.unwrap();
        let user = auth.sign_in("jana@example.sk", "heslo123").await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some("Jana"));
    }
}
