//! Property listings (`properties/{id}`)
//!
//! Reads for the public pages degrade to the sample dataset when Firestore
//! is unreachable; writes are owner-checked before they reach the store.

use super::decode_all;
use super::sample::sample_properties;
use crate::error::{FirebaseError, FirestoreError, InitError};
use crate::firestore::{collections, to_fields, Direction, DocumentStore, Query};
use crate::models::{NewProperty, Property, PropertyFilter, PropertyUpdate};
use crate::storage::{
    path_from_download_url, property_image_path, ImageUpload, ObjectStorage, StoredObject,
};
use chrono::Utc;
use std::sync::Arc;

/// Result of a listing read that may have fallen back to sample data
#[derive(Debug)]
pub struct Listings {
    /// Listings to show, newest first
    pub properties: Vec<Property>,
    /// The store error that forced the fallback, if any
    pub error: Option<FirebaseError>,
}

impl Listings {
    /// True when `properties` is the sample dataset rather than live data
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Listing access
#[derive(Clone)]
pub struct PropertyRepository {
    store: Arc<dyn DocumentStore>,
    storage: Option<Arc<dyn ObjectStorage>>,
}

impl std::fmt::Debug for PropertyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRepository")
            .field("has_storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl PropertyRepository {
    /// Create a repository without image storage
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, storage: None }
    }

    /// Attach image storage for uploads and deletes
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// All listings, newest first; never fails
    ///
    /// On any store error the warning is logged and the sample dataset is
    /// returned instead.
    pub async fn get_all_properties(&self) -> Vec<Property> {
        self.get_all_properties_checked().await.properties
    }

    /// All listings, newest first, reporting whether the fallback was used
    pub async fn get_all_properties_checked(&self) -> Listings {
        let query = Query::new(collections::PROPERTIES).order_by("createdAt", Direction::Descending);
        match self.store.query(&query).await {
            Ok(documents) => Listings {
                properties: newest_first(decode_all(collections::PROPERTIES, documents)),
                error: None,
            },
            Err(e) => {
                tracing::warn!(code = %e.code(), "loading listings failed, serving sample data: {}", e);
                Listings {
                    properties: sample_properties(),
                    error: Some(e),
                }
            }
        }
    }

    /// One listing by ID
    pub async fn get_property(&self, id: &str) -> Result<Option<Property>, FirebaseError> {
        match self.store.get(collections::PROPERTIES, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` featured listings, newest first
    pub async fn get_featured(&self, limit: usize) -> Result<Vec<Property>, FirebaseError> {
        let query = Query::new(collections::PROPERTIES).where_eq("isFeatured", true);
        let mut featured = newest_first(decode_all(
            collections::PROPERTIES,
            self.store.query(&query).await?,
        ));
        featured.truncate(limit);
        Ok(featured)
    }

    /// Listings owned by `user_id`, newest first
    pub async fn get_user_properties(&self, user_id: &str) -> Result<Vec<Property>, FirebaseError> {
        let query = Query::new(collections::PROPERTIES).where_eq("userId", user_id);
        Ok(newest_first(decode_all(
            collections::PROPERTIES,
            self.store.query(&query).await?,
        )))
    }

    /// Listings matching `filter`, newest first
    ///
    /// Equality criteria go to the store; ranges and the location substring
    /// are evaluated in process.
    pub async fn search(&self, filter: &PropertyFilter) -> Result<Vec<Property>, FirebaseError> {
        let mut query = Query::new(collections::PROPERTIES);
        if let Some(kind) = filter.property_type {
            query = query.where_eq("propertyType", kind.as_str());
        }
        if filter.featured_only {
            query = query.where_eq("isFeatured", true);
        }

        let properties: Vec<Property> =
            decode_all(collections::PROPERTIES, self.store.query(&query).await?);
        Ok(newest_first(
            properties.into_iter().filter(|p| filter.matches(p)).collect(),
        ))
    }

    /// Validate, upload images, then write the listing for `owner`
    pub async fn create_property(
        &self,
        owner: &str,
        listing: NewProperty,
        images: Vec<ImageUpload>,
    ) -> Result<Property, FirebaseError> {
        // Validate (error case first)
        if owner.is_empty() {
            return Err(FirestoreError::Unauthenticated.into());
        }
        listing.validate()?;

        let created_at = Utc::now();
        let uploaded = self.upload_images(owner, created_at, images).await?;

        let urls = uploaded.iter().map(|s| s.download_url.clone()).collect();
        let mut property = listing.into_property(owner, urls, created_at);
        let written = match to_fields(&property) {
            Ok(fields) => self.store.add(collections::PROPERTIES, fields).await,
            Err(e) => Err(e),
        };
        property.id = match written {
            Ok(id) => id,
            Err(e) => {
                self.remove_uploads(&uploaded).await;
                return Err(e);
            }
        };
        tracing::info!(id = %property.id, owner, images = property.images.len(), "created listing");
        Ok(property)
    }

    /// Apply `update` to a listing owned by `owner`
    pub async fn update_property(
        &self,
        owner: &str,
        id: &str,
        update: &PropertyUpdate,
    ) -> Result<(), FirebaseError> {
        update.validate()?;
        self.owned_property(owner, id).await?;
        if update.is_empty() {
            return Ok(());
        }
        self.store
            .update(collections::PROPERTIES, id, to_fields(update)?)
            .await
    }

    /// Delete a listing owned by `owner`, then its images (best-effort)
    pub async fn delete_property(&self, owner: &str, id: &str) -> Result<(), FirebaseError> {
        let property = self.owned_property(owner, id).await?;
        self.store.delete(collections::PROPERTIES, id).await?;
        tracing::info!(id, owner, "deleted listing");

        let Some(storage) = &self.storage else {
            return Ok(());
        };
        for url in &property.images {
            let path = match path_from_download_url(url) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(id, url = %url, "image URL has no object path: {}", e);
                    continue;
                }
            };
            if let Err(e) = storage.delete(&path).await {
                tracing::warn!(id, path = %path, "failed to delete listing image: {}", e);
            }
        }
        Ok(())
    }

    async fn owned_property(&self, owner: &str, id: &str) -> Result<Property, FirebaseError> {
        let Some(property) = self.get_property(id).await? else {
            return Err(FirestoreError::NotFound(format!("properties/{}", id)).into());
        };
        if !property.is_owned_by(owner) {
            tracing::warn!(id, owner, "rejected change to another user's listing");
            return Err(FirestoreError::PermissionDenied(format!(
                "properties/{} is not owned by the current user",
                id
            ))
            .into());
        }
        Ok(property)
    }

    async fn upload_images(
        &self,
        owner: &str,
        created_at: chrono::DateTime<Utc>,
        images: Vec<ImageUpload>,
    ) -> Result<Vec<StoredObject>, FirebaseError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let Some(storage) = &self.storage else {
            return Err(InitError::ServiceUnavailable("storage").into());
        };

        let mut uploaded = Vec::with_capacity(images.len());
        for (index, image) in images.into_iter().enumerate() {
            // Distinct millisecond per image keeps same-named files apart
            let timestamp = created_at + chrono::Duration::milliseconds(index as i64);
            let path = property_image_path(owner, timestamp, &image.filename);
            match storage.upload(&path, image.bytes, &image.content_type).await {
                Ok(stored) => uploaded.push(stored),
                Err(e) => {
                    self.remove_uploads(&uploaded).await;
                    return Err(e);
                }
            }
        }
        Ok(uploaded)
    }

    /// Best-effort removal of images whose listing was never written
    async fn remove_uploads(&self, uploaded: &[StoredObject]) {
        let Some(storage) = &self.storage else {
            return;
        };
        for stored in uploaded {
            if let Err(e) = storage.delete(&stored.path).await {
                tracing::warn!(path = %stored.path, "failed to remove orphaned upload: {}", e);
            }
        }
    }
}

fn newest_first(mut properties: Vec<Property>) -> Vec<Property> {
    properties.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    properties
}
