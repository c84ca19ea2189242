//! Saved listings (`favorites/{id}`)

use super::decode_all;
use crate::error::FirebaseError;
use crate::firestore::{collections, to_fields, DocumentStore, Query};
use crate::models::Favorite;
use std::sync::Arc;

/// Favorite access
#[derive(Clone)]
pub struct FavoriteRepository {
    store: Arc<dyn DocumentStore>,
}

impl FavoriteRepository {
    /// Create a repository over `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Save a listing; an existing pair is returned instead of duplicated
    pub async fn add(&self, user_id: &str, property_id: &str) -> Result<Favorite, FirebaseError> {
        if let Some(existing) = self.find(user_id, property_id).await? {
            return Ok(existing);
        }

        let mut favorite = Favorite {
            id: String::new(),
            user_id: user_id.to_string(),
            property_id: property_id.to_string(),
            created_at: chrono::Utc::now(),
        };
        favorite.id = self
            .store
            .add(collections::FAVORITES, to_fields(&favorite)?)
            .await?;
        Ok(favorite)
    }

    /// Remove a saved listing; removing one that is not saved succeeds
    pub async fn remove(&self, user_id: &str, property_id: &str) -> Result<(), FirebaseError> {
        for favorite in self.pairs(user_id, property_id).await? {
            self.store.delete(collections::FAVORITES, &favorite.id).await?;
        }
        Ok(())
    }

    /// Favorites of `user_id`, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<Favorite>, FirebaseError> {
        let query = Query::new(collections::FAVORITES).where_eq("userId", user_id);
        let mut favorites: Vec<Favorite> =
            decode_all(collections::FAVORITES, self.store.query(&query).await?);
        favorites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(favorites)
    }

    /// Whether `user_id` saved `property_id`
    pub async fn is_favorite(&self, user_id: &str, property_id: &str) -> Result<bool, FirebaseError> {
        Ok(self.find(user_id, property_id).await?.is_some())
    }

    async fn find(&self, user_id: &str, property_id: &str) -> Result<Option<Favorite>, FirebaseError> {
        Ok(self.pairs(user_id, property_id).await?.into_iter().next())
    }

    async fn pairs(&self, user_id: &str, property_id: &str) -> Result<Vec<Favorite>, FirebaseError> {
        let query = Query::new(collections::FAVORITES)
            .where_eq("userId", user_id)
            .where_eq("propertyId", property_id);
        Ok(decode_all(collections::FAVORITES, self.store.query(&query).await?))
    }
}
