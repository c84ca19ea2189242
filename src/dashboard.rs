//! Signed-in user's dashboard summary

use crate::app::FirebaseApp;
use crate::error::FirebaseError;
use crate::models::Property;
use crate::repository::{FavoriteRepository, MessageRepository, PropertyRepository};

/// What the dashboard page shows
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    /// Whose dashboard this is
    pub user_id: String,
    /// The user's own listings, newest first
    pub listings: Vec<Property>,
    /// Number of saved listings
    pub favorites_count: usize,
    /// Number of unread received messages
    pub unread_messages: usize,
}

impl DashboardSummary {
    /// Load the summary for `user_id` through the app's repositories
    pub async fn load(app: &FirebaseApp, user_id: &str) -> Result<Self, FirebaseError> {
        let properties = app.properties().await?;
        let favorites = app.favorites().await?;
        let messages = app.messages().await?;
        Self::from_repositories(&properties, &favorites, &messages, user_id).await
    }

    /// Load the summary from explicit repositories; the three reads run concurrently
    pub async fn from_repositories(
        properties: &PropertyRepository,
        favorites: &FavoriteRepository,
        messages: &MessageRepository,
        user_id: &str,
    ) -> Result<Self, FirebaseError> {
        if user_id.is_empty() {
            return Err(crate::error::AuthError::NoSignedInUser.into());
        }

        let (listings, saved, unread_messages) = tokio::try_join!(
            properties.get_user_properties(user_id),
            favorites.list(user_id),
            messages.unread_count(user_id),
        )?;

        Ok(Self {
            user_id: user_id.to_string(),
            listings,
            favorites_count: saved.len(),
            unread_messages,
        })
    }

    /// Sum of asking prices across the user's listings
    pub fn total_asking_price(&self) -> f64 {
        self.listings.iter().map(|p| p.price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::{collections, DocumentStore, Fields, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn listing(owner: &str, price: f64) -> Fields {
        let value = json!({
            "createdAt": "2024-05-01T08:00:00Z",
            "title": "Byt",
            "price": price,
            "location": "Nitra",
            "area": 50,
            "propertyType": "apartment",
            "userId": owner,
            "images": []
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let store = MemoryStore::new();
        store.add(collections::PROPERTIES, listing("u1", 100_000.0)).await.unwrap();
        store.add(collections::PROPERTIES, listing("u1", 50_000.0)).await.unwrap();
        store.add(collections::PROPERTIES, listing("u2", 70_000.0)).await.unwrap();

        let shared: Arc<dyn DocumentStore> = Arc::new(store);
        let properties = PropertyRepository::new(shared.clone());
        let favorites = FavoriteRepository::new(shared.clone());
        let messages = MessageRepository::new(shared);

        favorites.add("u1", "x").await.unwrap();
        messages.send("u2", "u1", "p", "Dobrý deň").await.unwrap();
        messages.send("u1", "u2", "p", "Dobrý deň").await.unwrap();

        let summary = DashboardSummary::from_repositories(&properties, &favorites, &messages, "u1")
            .await
            .unwrap();
        assert_eq!(summary.listings.len(), 2);
        assert_eq!(summary.favorites_count, 1);
        assert_eq!(summary.unread_messages, 1);
        assert_eq!(summary.total_asking_price(), 150_000.0);
    }

    #[tokio::test]
    async fn test_requires_user() {
        let shared: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let err = DashboardSummary::from_repositories(
            &PropertyRepository::new(shared.clone()),
            &FavoriteRepository::new(shared.clone()),
            &MessageRepository::new(shared),
            "",
        )
        .await
        .unwrap_err();
        assert!(err.requires_auth());
    }
}
