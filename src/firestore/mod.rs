//! Cloud Firestore access
//!
//! - `query.rs` → [`Query`], [`Filter`], ordering and in-process evaluation
//! - `value.rs` → codec between plain JSON and Firestore typed values
//! - `rest.rs` → [`RestFirestore`], the REST v1 client
//! - `memory.rs` → [`MemoryStore`], an in-process store with the same semantics
//! - `retrying.rs` → [`RetryingStore`], retry/backoff around any store
//!
//! Everything above the client talks to the [`DocumentStore`] trait, so the
//! backend is chosen once when the app is initialized and fakes drop in for
//! tests.

pub mod memory;
pub mod query;
pub mod rest;
pub mod retrying;
pub mod value;

pub use memory::MemoryStore;
pub use query::{Direction, Filter, FilterOp, Query};
pub use rest::RestFirestore;
pub use retrying::RetryingStore;

use crate::error::{FirebaseError, FirestoreError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Document fields as plain JSON
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Collection names used by the site
pub mod collections {
    /// Property listings
    pub const PROPERTIES: &str = "properties";
    /// User profiles keyed by Auth UID
    pub const USERS: &str = "users";
    /// Per-user settings keyed by Auth UID
    pub const USER_SETTINGS: &str = "userSettings";
    /// Messages between users about a listing
    pub const MESSAGES: &str = "messages";
    /// User/listing favorite pairs
    pub const FAVORITES: &str = "favorites";
}

/// A document read from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document ID (last path segment)
    pub id: String,
    /// Document fields
    pub data: Fields,
}

impl Document {
    /// Create a document
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Decode into a model, injecting the document ID as the `id` field
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FirestoreError> {
        let mut data = self.data.clone();
        data.insert("id".to_string(), serde_json::Value::String(self.id.clone()));
        serde_json::from_value(serde_json::Value::Object(data))
            .map_err(|e| FirestoreError::InvalidData(format!("document {}: {}", self.id, e)))
    }
}

/// Encode a model into document fields, dropping its `id` field
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, FirebaseError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(FirestoreError::InvalidArgument(format!(
            "document data must be an object, got {}",
            other
        ))
        .into()),
    }
}

/// Generate a 20-character alphanumeric document ID
pub fn auto_id() -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

/// Document database operations
///
/// `update` fails with `not-found` when the document does not exist; `set`
/// replaces the whole document; `delete` of a missing document succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FirebaseError>;

    /// Run a query against one collection
    async fn query(&self, query: &Query) -> Result<Vec<Document>, FirebaseError>;

    /// Create a document with an auto-generated ID, returning the ID
    async fn add(&self, collection: &str, data: Fields) -> Result<String, FirebaseError>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), FirebaseError>;

    /// Merge fields into an existing document
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), FirebaseError>;

    /// Delete a document
    async fn delete(&self, collection: &str, id: &str) -> Result<(), FirebaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Listing {
        id: String,
        title: String,
    }

    #[test]
    fn test_auto_id_shape() {
        let id = auto_id();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, auto_id());
    }

    #[test]
    fn test_decode_injects_id() {
        let mut data = Fields::new();
        data.insert("title".into(), json!("Byt v Petržalke"));
        let listing: Listing = Document::new("p1", data).decode().unwrap();
        assert_eq!(listing.id, "p1");
    }

    #[test]
    fn test_to_fields_drops_id() {
        let fields = to_fields(&Listing {
            id: "p1".into(),
            title: "Dom".into(),
        })
        .unwrap();
        assert!(!fields.contains_key("id"));
        assert_eq!(fields["title"], json!("Dom"));
    }

    #[test]
    fn test_decode_reports_invalid_data() {
        let mut data = Fields::new();
        data.insert("title".into(), json!(42));
        let err = Document::new("p1", data).decode::<Listing>().unwrap_err();
        assert_eq!(err.code(), "data-loss");
    }
}
