//! Retry-wrapped document store
//!
//! [`RetryingStore`] gives every get/query/add/set/update/delete the same
//! backoff policy, so repositories never hand-roll retry loops. `add` picks
//! the document ID once and retries a `set` under it, so a write whose
//! response was lost is not stored twice.

use super::query::Query;
use super::{auto_id, Document, DocumentStore, Fields};
use crate::error::FirebaseError;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;

/// [`DocumentStore`] that retries the wrapped store per a [`RetryPolicy`]
pub struct RetryingStore<S: ?Sized = dyn DocumentStore> {
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S: ?Sized> Clone for RetryingStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
        }
    }
}

impl<S: DocumentStore + ?Sized> RetryingStore<S> {
    /// Wrap `inner` with the default policy (3 attempts, retryable errors only)
    pub fn new(inner: Arc<S>) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    /// Wrap `inner` with an explicit policy
    pub fn with_policy(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The policy in effect
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for RetryingStore<S> {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FirebaseError> {
        let operation = format!("get {}/{}", collection, id);
        self.policy
            .run(&operation, move || self.inner.get(collection, id))
            .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, FirebaseError> {
        let operation = format!("query {}", query.collection);
        self.policy.run(&operation, move || self.inner.query(query)).await
    }

    async fn add(&self, collection: &str, data: Fields) -> Result<String, FirebaseError> {
        let id = auto_id();
        let operation = format!("add {}/{}", collection, id);
        let target = id.as_str();
        self.policy
            .run(&operation, move || self.inner.set(collection, target, data.clone()))
            .await?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), FirebaseError> {
        let operation = format!("set {}/{}", collection, id);
        self.policy
            .run(&operation, move || self.inner.set(collection, id, data.clone()))
            .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), FirebaseError> {
        let operation = format!("update {}/{}", collection, id);
        self.policy
            .run(&operation, move || self.inner.update(collection, id, fields.clone()))
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FirebaseError> {
        let operation = format!("delete {}/{}", collection, id);
        self.policy
            .run(&operation, move || self.inner.delete(collection, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use crate::firestore::MemoryStore;
    use crate::retry::RetryMode;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose first write lands but reports a timeout
    struct LostFirstResponse {
        inner: MemoryStore,
        lost: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for LostFirstResponse {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FirebaseError> {
            self.inner.get(collection, id).await
        }

        async fn query(&self, query: &Query) -> Result<Vec<Document>, FirebaseError> {
            self.inner.query(query).await
        }

        async fn add(&self, collection: &str, data: Fields) -> Result<String, FirebaseError> {
            let id = auto_id();
            self.set(collection, &id, data).await?;
            Ok(id)
        }

        async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), FirebaseError> {
            self.inner.set(collection, id, data).await?;
            if !self.lost.swap(true, Ordering::SeqCst) {
                return Err(FirestoreError::DeadlineExceeded.into());
            }
            Ok(())
        }

        async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), FirebaseError> {
            self.inner.update(collection, id, fields).await
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<(), FirebaseError> {
            self.inner.delete(collection, id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failures() {
        let memory = MemoryStore::new();
        let store = RetryingStore::new(Arc::new(memory.clone()));
        memory.fail_next(2, FirestoreError::Unavailable("flaky".into())).await;

        let mut data = Fields::new();
        data.insert("title".into(), json!("Rodinný dom"));
        let id = store.add("properties", data).await.unwrap();

        assert_eq!(memory.operation_count(), 3);
        assert!(memory.get("properties", &id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_lost_response_writes_once() {
        let memory = MemoryStore::new();
        let store = RetryingStore::new(Arc::new(LostFirstResponse {
            inner: memory.clone(),
            lost: AtomicBool::new(false),
        }));

        let mut data = Fields::new();
        data.insert("content".into(), json!("Je byt ešte voľný?"));
        let id = store.add("messages", data).await.unwrap();

        assert_eq!(memory.len("messages").await, 1);
        assert_eq!(memory.operation_count(), 2);
        assert!(memory.get("messages", &id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wraps_trait_objects() {
        let inner: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let store: RetryingStore = RetryingStore::new(inner);
        let id = store.add("favorites", Fields::new()).await.unwrap();
        assert!(store.clone().get("favorites", &id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let memory = MemoryStore::new();
        let store = RetryingStore::new(Arc::new(memory.clone()));
        memory.fail_next(5, FirestoreError::DeadlineExceeded).await;

        let err = store.get("properties", "p1").await.unwrap_err();
        assert_eq!(err.code(), "deadline-exceeded");
        assert_eq!(memory.operation_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document_update_is_not_retried() {
        let memory = MemoryStore::new();
        let store = RetryingStore::new(Arc::new(memory.clone()));

        let err = store.update("properties", "gone", Fields::new()).await.unwrap_err();
        assert_eq!(err.code(), "not-found");
        assert_eq!(memory.operation_count(), 1);

        let blanket = RetryingStore::with_policy(
            Arc::new(memory.clone()),
            RetryPolicy::default().with_mode(RetryMode::All),
        );
        let _ = blanket.update("properties", "gone", Fields::new()).await;
        assert_eq!(memory.operation_count(), 4);
    }
}
