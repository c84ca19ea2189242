//! Firebase Storage for listing images
//!
//! Images live at `properties/{userId}/{timestampMillis}_{filename}`. The
//! REST client uploads through the Firebase Storage v0 endpoint and attaches
//! a download token so the returned URL works without signing.

use crate::config::FirebaseConfig;
use crate::error::{FirebaseError, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const PRODUCTION_HOST: &str = "https://firebasestorage.googleapis.com";

/// An uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object path inside the bucket
    pub path: String,
    /// Public download URL
    pub download_url: String,
}

/// Object storage operations
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `bytes` to `path`
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, FirebaseError>;

    /// Delete the object at `path`
    async fn delete(&self, path: &str) -> Result<(), FirebaseError>;
}

/// Image file selected in the listing form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Original file name
    pub filename: String,
    /// MIME type
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Build `properties/{userId}/{millis}_{filename}`
///
/// Path separators and whitespace in the file name are replaced so a name
/// cannot escape the user's folder.
pub fn property_image_path(user_id: &str, timestamp: DateTime<Utc>, filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    format!(
        "properties/{}/{}_{}",
        user_id,
        timestamp.timestamp_millis(),
        sanitized
    )
}

/// Recover the object path from a download URL produced by this module
pub fn path_from_download_url(url: &str) -> Result<String, StorageError> {
    let encoded = url
        .split_once("/o/")
        .and_then(|(_, rest)| rest.split('?').next())
        .filter(|encoded| !encoded.is_empty())
        .ok_or_else(|| StorageError::InvalidArgument(format!("not a download URL: {}", url)))?;
    urlencoding::decode(encoded)
        .map(|path| path.into_owned())
        .map_err(|e| StorageError::InvalidArgument(format!("object path is not UTF-8: {}", e)))
}

/// Firebase Storage REST client
#[derive(Clone)]
pub struct RestStorage {
    inner: Arc<RestStorageInner>,
}

struct RestStorageInner {
    base_url: String,
    bucket: String,
    http_client: reqwest::Client,
    id_token: RwLock<Option<String>>,
}

impl RestStorage {
    /// Create a client for the configured bucket
    pub fn new(config: &FirebaseConfig) -> Result<Self, FirebaseError> {
        if config.storage_bucket.is_empty() {
            return Err(FirebaseError::Config("Storage bucket is not configured".to_string()));
        }
        let host = match &config.emulators {
            Some(emulators) => emulators.storage_url(),
            None => PRODUCTION_HOST.to_string(),
        };
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| FirebaseError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestStorageInner {
                base_url: host.trim_end_matches('/').to_string(),
                bucket: config.storage_bucket.clone(),
                http_client,
                id_token: RwLock::new(None),
            }),
        })
    }

    /// Use `token` for subsequent uploads and deletes
    pub async fn set_id_token(&self, token: Option<String>) {
        *self.inner.id_token.write().await = token;
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/v0/b/{}/o/{}",
            self.inner.base_url,
            self.inner.bucket,
            urlencoding::encode(path)
        )
    }

    async fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.inner.id_token.read().await.as_deref() {
            Some(token) => builder.header("Authorization", format!("Firebase {}", token)),
            None => builder,
        }
    }
}

async fn storage_error(response: reqwest::Response, path: &str) -> FirebaseError {
    let status = response.status().as_u16();
    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    let message = body["error"]["message"]
        .as_str()
        .map(|m| format!("{}: {}", path, m))
        .unwrap_or_else(|| path.to_string());
    StorageError::from_http_status(status, message).into()
}

#[async_trait]
impl ObjectStorage for RestStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, FirebaseError> {
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("empty object path".to_string()).into());
        }

        let token = uuid::Uuid::new_v4().to_string();
        let url = format!(
            "{}/v0/b/{}/o",
            self.inner.base_url, self.inner.bucket
        );
        let builder = self
            .inner
            .http_client
            .post(url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header("Content-Type", content_type)
            .header("X-Goog-Meta-firebaseStorageDownloadTokens", token.as_str())
            .body(bytes);
        let response = self
            .authorize(builder)
            .await
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(storage_error(response, path).await);
        }

        // Metadata response carries the token actually stored, which wins
        let metadata: serde_json::Value = response.json().await?;
        let token = metadata["downloadTokens"]
            .as_str()
            .and_then(|tokens| tokens.split(',').next())
            .map(str::to_string)
            .unwrap_or(token);

        tracing::info!(path, "uploaded object");
        Ok(StoredObject {
            path: path.to_string(),
            download_url: format!("{}?alt=media&token={}", self.object_url(path), token),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), FirebaseError> {
        let builder = self.inner.http_client.delete(self.object_url(path));
        let response = self
            .authorize(builder)
            .await
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(storage_error(response, path).await);
        }
        tracing::info!(path, "deleted object");
        Ok(())
    }
}

impl std::fmt::Debug for RestStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStorage")
            .field("bucket", &self.inner.bucket)
            .finish()
    }
}

/// In-memory [`ObjectStorage`]
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<String, (String, Vec<u8>)>>>,
}

impl MemoryStorage {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored object paths, sorted
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, FirebaseError> {
        if path.is_empty() {
            return Err(StorageError::InvalidArgument("empty object path".to_string()).into());
        }
        self.objects
            .write()
            .await
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(StoredObject {
            path: path.to_string(),
            download_url: format!("memory://bucket/o/{}?alt=media", urlencoding::encode(path)),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), FirebaseError> {
        match self.objects.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::ObjectNotFound(path.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_property_image_path() {
        let ts = Utc.timestamp_millis_opt(1_714_550_400_000).unwrap();
        assert_eq!(
            property_image_path("u1", ts, "obývačka 1.jpg"),
            "properties/u1/1714550400000_obývačka_1.jpg"
        );
        assert_eq!(
            property_image_path("u1", ts, "../../etc/passwd"),
            "properties/u1/1714550400000__.._etc_passwd"
        );
    }

    #[test]
    fn test_download_url_round_trip() {
        let path = "properties/u1/1714550400000_byt.jpg";
        let url = format!("https://firebasestorage.googleapis.com/v0/b/b/o/{}?alt=media&token=t", urlencoding::encode(path));
        assert!(url.contains("properties%2Fu1%2F"));
        assert_eq!(path_from_download_url(&url).unwrap(), path);
    }

    #[test]
    fn test_download_url_rejects_bad_paths() {
        let err = path_from_download_url("https://example.com/image.jpg").unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        // %C3 alone is not valid UTF-8
        let err = path_from_download_url("memory://bucket/o/properties%2F%C3.jpg?alt=media").unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let stored = storage
            .upload("properties/u1/1_a.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(path_from_download_url(&stored.download_url).unwrap(), "properties/u1/1_a.jpg");
        assert_eq!(storage.paths().await, vec!["properties/u1/1_a.jpg".to_string()]);

        storage.delete("properties/u1/1_a.jpg").await.unwrap();
        let err = storage.delete("properties/u1/1_a.jpg").await.unwrap_err();
        assert_eq!(err.code(), "storage/object-not-found");
    }
}
