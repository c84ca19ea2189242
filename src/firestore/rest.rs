//! Firestore REST v1 client
//!
//! Talks to `https://firestore.googleapis.com/v1` (or the emulator) with
//! `reqwest`. When a user is signed in, their ID token is sent as a bearer
//! token so security rules see `request.auth`.

use super::query::Query;
use super::value::{decode_fields, encode_fields, encode_value};
use super::{auto_id, Document, DocumentStore, Fields};
use crate::config::FirebaseConfig;
use crate::error::{FirebaseError, FirestoreError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

/// Firestore client over the REST API
#[derive(Clone)]
pub struct RestFirestore {
    inner: Arc<RestFirestoreInner>,
}

struct RestFirestoreInner {
    base_url: String,
    project_id: String,
    database_id: String,
    http_client: reqwest::Client,
    id_token: RwLock<Option<String>>,
}

impl RestFirestore {
    /// Create a client for the project's `(default)` database
    pub fn new(config: &FirebaseConfig) -> Result<Self, FirebaseError> {
        if config.project_id.is_empty() {
            return Err(FirebaseError::Config("Project ID cannot be empty".to_string()));
        }
        let host = match &config.emulators {
            Some(emulators) => emulators.firestore_url(),
            None => PRODUCTION_HOST.to_string(),
        };
        Self::with_host(host, &config.project_id, "(default)")
    }

    /// Create a client against an explicit host
    pub fn with_host(
        host: impl Into<String>,
        project_id: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Result<Self, FirebaseError> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| FirebaseError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(RestFirestoreInner {
                base_url: format!("{}/v1", host.into().trim_end_matches('/')),
                project_id: project_id.into(),
                database_id: database_id.into(),
                http_client,
                id_token: RwLock::new(None),
            }),
        })
    }

    /// Get the project ID
    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    /// Use `token` for subsequent requests; `None` sends requests unauthenticated
    pub async fn set_id_token(&self, token: Option<String>) {
        *self.inner.id_token.write().await = token;
    }

    /// `projects/{p}/databases/{d}/documents`
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.inner.project_id, self.inner.database_id
        )
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.inner.base_url, resource)
    }

    async fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.inner.http_client.request(method, url);
        match self.inner.id_token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FirebaseError> {
        let response = builder
            .send()
            .await
            .map_err(|e| FirestoreError::Connection(format!("request failed: {}", e)))?;
        Ok(response)
    }

    /// Convert a REST document (`{name, fields, createTime, updateTime}`)
    fn parse_document(value: &Value) -> Result<Document, FirestoreError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| FirestoreError::InvalidData("document without name".to_string()))?;
        let id = name.rsplit('/').next().unwrap_or(name).to_string();
        let data = match value.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields)?,
            None => Fields::new(),
        };
        Ok(Document { id, data })
    }

    fn structured_query(query: &Query) -> Value {
        let mut structured = json!({
            "from": [{ "collectionId": query.collection }],
        });

        let filters: Vec<Value> = query
            .filters
            .iter()
            .map(|f| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": f.field },
                        "op": f.op.as_rest(),
                        "value": encode_value(&f.value),
                    }
                })
            })
            .collect();
        match filters.len() {
            0 => {}
            1 => structured["where"] = filters[0].clone(),
            _ => {
                structured["where"] = json!({
                    "compositeFilter": { "op": "AND", "filters": filters }
                })
            }
        }

        if !query.order_by.is_empty() {
            let order: Vec<Value> = query
                .order_by
                .iter()
                .map(|(field, direction)| {
                    json!({
                        "field": { "fieldPath": field },
                        "direction": direction.as_rest(),
                    })
                })
                .collect();
            structured["orderBy"] = Value::Array(order);
        }

        if let Some(limit) = query.limit {
            structured["limit"] = json!(limit);
        }

        structured
    }
}

/// Map a non-success response to a FirestoreError
async fn error_from_response(response: reqwest::Response, context: &str) -> FirebaseError {
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"]["message"]
        .as_str()
        .map(|m| format!("{}: {}", context, m))
        .unwrap_or_else(|| context.to_string());
    match body["error"]["status"].as_str() {
        Some(code) => FirestoreError::from_status(code, message).into(),
        None => FirestoreError::from_http_status(status, message).into(),
    }
}

#[async_trait]
impl DocumentStore for RestFirestore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FirebaseError> {
        let name = self.document_name(collection, id);
        let builder = self.request(reqwest::Method::GET, self.url(&name)).await;
        let response = self.send(builder).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response, &name).await);
        }

        let body: Value = response.json().await?;
        Ok(Some(Self::parse_document(&body)?))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, FirebaseError> {
        let url = self.url(&format!("{}:runQuery", self.documents_root()));
        let builder = self
            .request(reqwest::Method::POST, url)
            .await
            .json(&json!({ "structuredQuery": Self::structured_query(query) }));
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &query.collection).await);
        }

        // One element per result; elements without `document` only carry readTime
        let rows: Vec<Value> = response.json().await?;
        let documents = rows
            .iter()
            .filter_map(|row| row.get("document"))
            .map(Self::parse_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    async fn add(&self, collection: &str, data: Fields) -> Result<String, FirebaseError> {
        let id = auto_id();
        self.set(collection, &id, data).await?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Fields) -> Result<(), FirebaseError> {
        let name = self.document_name(collection, id);
        let builder = self
            .request(reqwest::Method::PATCH, self.url(&name))
            .await
            .json(&json!({ "fields": encode_fields(&data) }));
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &name).await);
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), FirebaseError> {
        let name = self.document_name(collection, id);
        let mut params: Vec<(&str, &str)> = fields
            .keys()
            .map(|field| ("updateMask.fieldPaths", field.as_str()))
            .collect();
        params.push(("currentDocument.exists", "true"));

        let builder = self
            .request(reqwest::Method::PATCH, self.url(&name))
            .await
            .query(&params)
            .json(&json!({ "fields": encode_fields(&fields) }));
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &name).await);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FirebaseError> {
        let name = self.document_name(collection, id);
        let builder = self.request(reqwest::Method::DELETE, self.url(&name)).await;
        let response = self.send(builder).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &name).await);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RestFirestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestFirestore")
            .field("base_url", &self.inner.base_url)
            .field("project_id", &self.inner.project_id)
            .finish()
    }
}
