//! Typed data access over a [`DocumentStore`](crate::firestore::DocumentStore)
//!
//! - `properties.rs` → listings, search, image upload, sample fallback
//! - `users.rs` → profiles and settings
//! - `messages.rs` → messages between users about a listing
//! - `favorites.rs` → saved listings
//! - `sample.rs` → static listings shown when Firestore is unreachable
//!
//! Repositories are cheap to clone and hold the store as `Arc<dyn _>`; in
//! the app the store is a [`RetryingStore`](crate::firestore::RetryingStore).

pub mod favorites;
pub mod messages;
pub mod properties;
pub mod sample;
pub mod users;

pub use favorites::FavoriteRepository;
pub use messages::MessageRepository;
pub use properties::{Listings, PropertyRepository};
pub use users::{ProfileUpdate, UserRepository};

use crate::firestore::Document;
use serde::de::DeserializeOwned;

/// Decode documents, skipping (and logging) any that do not fit the model
pub(crate) fn decode_all<T: DeserializeOwned>(collection: &str, documents: Vec<Document>) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(collection, id = %doc.id, "skipping malformed document: {}", e);
                None
            }
        })
        .collect()
}
