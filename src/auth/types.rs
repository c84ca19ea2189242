//! Authentication types

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Signed-in Firebase user
///
/// Cheap to share as `Arc<User>`; tokens never appear in `Debug` or serialized
/// output.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique Firebase user ID
    pub uid: String,

    /// Email address
    pub email: Option<String>,

    /// Display name
    pub display_name: Option<String>,

    /// Photo URL
    pub photo_url: Option<String>,

    /// Whether the email address is verified
    pub email_verified: bool,

    /// ID token (JWT)
    #[serde(skip)]
    pub(crate) id_token: Option<String>,

    /// Refresh token
    #[serde(skip)]
    pub(crate) refresh_token: Option<String>,

    /// ID token expiry, seconds since epoch
    #[serde(skip)]
    pub(crate) token_expiration: Option<i64>,
}

impl User {
    /// User with only a UID and email, no tokens
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
            ..Default::default()
        }
    }

    /// Attach an ID token; its expiry is read from the JWT payload
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        let id_token = id_token.into();
        self.token_expiration = jwt_expiration(&id_token);
        self.id_token = Some(id_token);
        self
    }

    /// Current ID token, if any
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// ID token expiry, seconds since epoch
    pub fn token_expiration(&self) -> Option<i64> {
        self.token_expiration
    }

    /// True if the token expires within five minutes of `now` (seconds)
    pub fn token_needs_refresh(&self, now: i64) -> bool {
        match self.token_expiration {
            Some(expiration) => now >= expiration - 300,
            None => self.id_token.is_none(),
        }
    }

    /// Name to greet the user with: display name, else the email's local part
    pub fn greeting_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or_else(|| self.email.as_deref().and_then(|e| e.split('@').next()))
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("email_verified", &self.email_verified)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read `exp` from a JWT payload without verifying the signature
pub(crate) fn jwt_expiration(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims["exp"].as_i64()
}

/// Profile fields to change; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    /// New display name
    pub display_name: Option<String>,
    /// New photo URL
    pub photo_url: Option<String>,
}

impl ProfileChanges {
    /// Change only the display name
    pub fn with_display_name(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            photo_url: None,
        }
    }

    /// Builder: set the photo URL
    pub fn photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// True if nothing would change
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }

    /// Apply to a user record
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.display_name {
            user.display_name = Some(name.clone());
        }
        if let Some(url) = &self.photo_url {
            user.photo_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"RS256"}"#);
        let payload = engine.encode(format!(r#"{{"exp":{},"user_id":"u1"}}"#, exp));
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_jwt_expiration() {
        assert_eq!(jwt_expiration(&token_with_exp(1_900_000_000)), Some(1_900_000_000));
        assert_eq!(jwt_expiration("not-a-jwt"), None);
        assert_eq!(jwt_expiration("a.!!!.c"), None);
    }

    #[test]
    fn test_token_refresh_window() {
        let user = User::new("u1", None).with_id_token(token_with_exp(10_000));
        assert!(!user.token_needs_refresh(9_000));
        assert!(user.token_needs_refresh(9_800));
        assert!(User::new("u2", None).token_needs_refresh(0));
    }

    #[test]
    fn test_debug_redacts_token() {
        let user = User::new("u1", Some("a@b.sk".into())).with_id_token("secret.token.value");
        let debug = format!("{:?}", user);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_serialized_user_has_no_tokens() {
        let user = User::new("u1", Some("a@b.sk".into())).with_id_token("secret.token.value");
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"uid\":\"u1\""));
    }

    #[test]
    fn test_profile_changes() {
        let mut user = User::new("u1", Some("jana@example.sk".into()));
        assert_eq!(user.greeting_name(), Some("jana"));

        let changes = ProfileChanges::with_display_name("Jana Nováková").photo_url("https://x/p.jpg");
        assert!(!changes.is_empty());
        changes.apply(&mut user);
        assert_eq!(user.greeting_name(), Some("Jana Nováková"));
        assert_eq!(user.photo_url.as_deref(), Some("https://x/p.jpg"));
        assert!(ProfileChanges::default().is_empty());
    }
}
