//! User profiles (`users/{uid}`) and settings (`userSettings/{uid}`)

use crate::error::FirebaseError;
use crate::firestore::{collections, to_fields, DocumentStore};
use crate::models::{UserProfile, UserSettings};
use serde::Serialize;
use std::sync::Arc;

/// Editable profile fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Profile and settings access
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    /// Create a repository over `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Profile for `uid`, if one exists
    pub async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, FirebaseError> {
        match self.store.get(collections::USERS, uid).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Create (or replace) the profile document for a new account
    pub async fn create_profile(
        &self,
        uid: &str,
        email: &str,
        name: Option<String>,
    ) -> Result<UserProfile, FirebaseError> {
        if uid.is_empty() {
            return Err(FirebaseError::Validation("User ID is required".to_string()));
        }
        let profile = UserProfile {
            id: uid.to_string(),
            email: email.to_string(),
            name,
            phone: None,
            created_at: chrono::Utc::now(),
        };
        self.store
            .set(collections::USERS, uid, to_fields(&profile)?)
            .await?;
        tracing::info!(uid, "created user profile");
        Ok(profile)
    }

    /// Merge `update` into an existing profile
    pub async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), FirebaseError> {
        let fields = to_fields(update)?;
        if fields.is_empty() {
            return Ok(());
        }
        self.store.update(collections::USERS, uid, fields).await
    }

    /// Settings for `uid`; defaults when none were saved
    pub async fn get_settings(&self, uid: &str) -> Result<UserSettings, FirebaseError> {
        match self.store.get(collections::USER_SETTINGS, uid).await? {
            Some(doc) => Ok(doc.decode()?),
            None => Ok(UserSettings {
                id: uid.to_string(),
                ..UserSettings::default()
            }),
        }
    }

    /// Replace the settings for `uid`
    pub async fn save_settings(&self, uid: &str, settings: &UserSettings) -> Result<(), FirebaseError> {
        self.store
            .set(collections::USER_SETTINGS, uid, to_fields(settings)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::MemoryStore;
    use crate::models::ContactVisibility;

    fn repo() -> (MemoryStore, UserRepository) {
        let store = MemoryStore::new();
        (store.clone(), UserRepository::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_profile_lifecycle() {
        let (_, users) = repo();
        assert!(users.get_profile("u1").await.unwrap().is_none());

        users.create_profile("u1", "jana@example.sk", None).await.unwrap();
        users
            .update_profile(
                "u1",
                &ProfileUpdate {
                    name: Some("Jana".into()),
                    phone: Some("+421 900 000 000".into()),
                },
            )
            .await
            .unwrap();

        let profile = users.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.email, "jana@example.sk");
        assert_eq!(profile.name.as_deref(), Some("Jana"));
    }

    #[tokio::test]
    async fn test_update_missing_profile_is_not_found() {
        let (_, users) = repo();
        let err = users
            .update_profile("ghost", &ProfileUpdate { name: Some("x".into()), phone: None })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn test_settings_default_then_saved() {
        let (store, users) = repo();
        let settings = users.get_settings("u1").await.unwrap();
        assert_eq!(settings.language, "sk");
        assert_eq!(settings.id, "u1");
        assert!(store.is_empty(collections::USER_SETTINGS).await);

        let changed = UserSettings {
            language: "en".into(),
            email_notifications: false,
            default_contact_visibility: ContactVisibility::Hidden,
            ..settings
        };
        users.save_settings("u1", &changed).await.unwrap();
        assert_eq!(users.get_settings("u1").await.unwrap(), changed);
    }
}
