//! In-process document store
//!
//! Same semantics as the REST client (auto-IDs, filters, ordering, limits,
//! `update` on a missing document fails with `not-found`). Used for local
//! development without a project and as the fake in tests, where
//! [`MemoryStore::fail_next`] injects backend failures.

use super::query::Query;
use super::{auto_id, Document, DocumentStore, Fields};
use crate::error::{FirebaseError, FirestoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// In-memory [`DocumentStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    failures: Mutex<VecDeque<FirestoreError>>,
    operations: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` operations with `error`
    pub async fn fail_next(&self, count: usize, error: FirestoreError) {
        let mut failures = self.inner.failures.lock().await;
        for _ in 0..count {
            failures.push_back(error.clone());
        }
    }

    /// Number of operations attempted, including injected failures
    pub fn operation_count(&self) -> usize {
        self.inner.operations.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection
    pub async fn len(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// True when the collection holds no documents
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    async fn begin(&self) -> Result<(), FirebaseError> {
        self.inner.operations.fetch_add(1, Ordering::SeqCst);
        match self.inner.failures.lock().await.pop_front() {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FirebaseError> {
        self.begin().await?;
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document::new(id, data.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, FirebaseError> {
        self.begin().await?;
        let collections = self.inner.collections.read().await;
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };
        let all = docs
            .iter()
            .map(|(id, data)| Document::new(id.clone(), data.clone()));
        Ok(query.apply(all))
    }

    async fn add(&self, collection: &str, data: Fields) -> Result<String, FirebaseError> {
        self.begin().await?;
        let id = auto_id();
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), FirebaseError> {
        self.begin().await?;
        self.inner
            .collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), FirebaseError> {
        self.begin().await?;
        let mut collections = self.inner.collections.write().await;
        let Some(existing) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Err(FirestoreError::NotFound(format!("{}/{}", collection, id)).into());
        };
        for (key, value) in fields {
            existing.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FirebaseError> {
        self.begin().await?;
        if let Some(docs) = self.inner.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_add_get_delete() {
        let store = MemoryStore::new();
        let id = store.add("properties", fields(json!({"title": "Byt"}))).await.unwrap();

        let doc = store.get("properties", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["title"], json!("Byt"));

        store.delete("properties", &id).await.unwrap();
        assert!(store.get("properties", &id).await.unwrap().is_none());
        // Deleting again is fine
        store.delete("properties", &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = MemoryStore::new();
        store
            .set("users", "u1", fields(json!({"email": "a@b.sk", "name": "Eva"})))
            .await
            .unwrap();
        store
            .update("users", "u1", fields(json!({"phone": "+421900000000"})))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], json!("Eva"));
        assert_eq!(doc.data["phone"], json!("+421900000000"));

        let err = store.update("users", "missing", Fields::new()).await.unwrap_err();
        assert_eq!(err.code(), "not-found");
    }

    #[tokio::test]
    async fn test_query_uses_filters() {
        let store = MemoryStore::new();
        store.set("favorites", "f1", fields(json!({"userId": "u1", "propertyId": "p1"}))).await.unwrap();
        store.set("favorites", "f2", fields(json!({"userId": "u2", "propertyId": "p1"}))).await.unwrap();

        let docs = store
            .query(&Query::new("favorites").where_eq("userId", "u1"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "f1");
        assert!(store.query(&Query::new("nothing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(2, FirestoreError::Unavailable("down".into())).await;

        assert!(store.get("properties", "x").await.is_err());
        assert!(store.get("properties", "x").await.is_err());
        assert!(store.get("properties", "x").await.unwrap().is_none());
        assert_eq!(store.operation_count(), 3);
    }
}
