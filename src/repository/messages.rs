//! Messages between users about a listing (`messages/{id}`)

use super::decode_all;
use crate::error::FirebaseError;
use crate::firestore::{collections, to_fields, Direction, DocumentStore, Fields, Query};
use crate::models::Message;
use std::sync::Arc;

/// Message access
#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<dyn DocumentStore>,
}

impl MessageRepository {
    /// Create a repository over `store`
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Send `content` about `property_id` to `recipient_id`
    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
        property_id: &str,
        content: &str,
    ) -> Result<Message, FirebaseError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FirebaseError::Validation("Message cannot be empty".to_string()));
        }
        if sender_id == recipient_id {
            return Err(FirebaseError::Validation(
                "You cannot send a message to yourself".to_string(),
            ));
        }

        let mut message = Message {
            id: String::new(),
            property_id: property_id.to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            read: false,
            created_at: chrono::Utc::now(),
        };
        message.id = self
            .store
            .add(collections::MESSAGES, to_fields(&message)?)
            .await?;
        tracing::debug!(id = %message.id, property_id, "message sent");
        Ok(message)
    }

    /// Messages received by `recipient_id`, newest first
    pub async fn inbox(&self, recipient_id: &str) -> Result<Vec<Message>, FirebaseError> {
        self.list("recipientId", recipient_id).await
    }

    /// Messages sent by `sender_id`, newest first
    pub async fn sent(&self, sender_id: &str) -> Result<Vec<Message>, FirebaseError> {
        self.list("senderId", sender_id).await
    }

    /// Mark one message as read
    pub async fn mark_read(&self, id: &str) -> Result<(), FirebaseError> {
        let mut fields = Fields::new();
        fields.insert("read".to_string(), serde_json::Value::Bool(true));
        self.store.update(collections::MESSAGES, id, fields).await
    }

    /// Number of unread messages for `recipient_id`
    pub async fn unread_count(&self, recipient_id: &str) -> Result<usize, FirebaseError> {
        let query = Query::new(collections::MESSAGES)
            .where_eq("recipientId", recipient_id)
            .where_eq("read", false);
        Ok(self.store.query(&query).await?.len())
    }

    async fn list(&self, field: &str, user_id: &str) -> Result<Vec<Message>, FirebaseError> {
        let query = Query::new(collections::MESSAGES)
            .where_eq(field, user_id)
            .order_by("createdAt", Direction::Descending);
        let mut messages: Vec<Message> =
            decode_all(collections::MESSAGES, self.store.query(&query).await?);
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::MemoryStore;

    #[tokio::test]
    async fn test_send_and_read() {
        let messages = MessageRepository::new(Arc::new(MemoryStore::new()));
        let first = messages.send("buyer", "owner", "p1", "Je byt ešte voľný?").await.unwrap();
        messages.send("buyer", "owner", "p2", "  Dobrý deň  ").await.unwrap();
        messages.send("owner", "buyer", "p1", "Áno").await.unwrap();

        let inbox = messages.inbox("owner").await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert!(inbox.iter().all(|m| m.recipient_id == "owner"));
        assert!(inbox[0].created_at >= inbox[1].created_at);
        assert_eq!(messages.sent("owner").await.unwrap().len(), 1);
        assert_eq!(messages.unread_count("owner").await.unwrap(), 2);

        messages.mark_read(&first.id).await.unwrap();
        assert_eq!(messages.unread_count("owner").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_self_messages() {
        let messages = MessageRepository::new(Arc::new(MemoryStore::new()));
        let err = messages.send("a", "b", "p1", "   ").await.unwrap_err();
        assert_eq!(err.code(), "invalid-argument");
        assert!(messages.send("a", "a", "p1", "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_mark_read_missing_message() {
        let messages = MessageRepository::new(Arc::new(MemoryStore::new()));
        let err = messages.mark_read("nope").await.unwrap_err();
        assert_eq!(err.code(), "not-found");
    }
}
