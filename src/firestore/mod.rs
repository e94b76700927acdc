pub mod dto;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::backend::{BackendError, NewTaskDocument, RemoteBackend};
use crate::config::FirestoreConfig;
use crate::error::AppError;
use crate::feed::{self, ChangeFeed, RawTaskDocument, SnapshotSource};
use crate::models::TaskPatch;

/// Task collection stored in Firestore, spoken to over its REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    config: FirestoreConfig,
}

impl FirestoreClient {
    pub fn new(config: FirestoreConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn documents_path(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.config.project_id, self.config.database
        )
    }

    fn document_name(&self, id: &str) -> String {
        format!("{}/{}/{}", self.documents_path(), self.config.collection, id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Adds the API key as a `key` query parameter and the bearer token,
    /// whichever are configured.
    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn commit(&self, write: dto::Write) -> Result<(), BackendError> {
        let url = self.url(&format!("{}:commit", self.documents_path()));
        let body = dto::CommitRequest {
            writes: vec![write],
        };

        let response = self.authorize(self.client.post(&url)).json(&body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for FirestoreClient {
    async fn fetch_documents(&self) -> Result<Vec<RawTaskDocument>, BackendError> {
        let url = self.url(&format!("{}:runQuery", self.documents_path()));
        let body = dto::RunQueryRequest::newest_first(&self.config.collection);

        let response = self.authorize(self.client.post(&url)).json(&body).send().await?;
        let response = check_status(response).await?;
        let items: Vec<dto::RunQueryResponseItem> = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let mut docs = Vec::new();
        for document in items.into_iter().filter_map(|item| item.document) {
            match parse_document(document) {
                Ok(doc) => docs.push(doc),
                Err(e) => tracing::warn!("Skipping unreadable task document: {}", e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl RemoteBackend for FirestoreClient {
    fn subscribe(&self) -> ChangeFeed {
        feed::spawn_polling(Arc::new(self.clone()), self.config.poll_interval)
    }

    async fn create_task(&self, doc: &NewTaskDocument) -> Result<(), BackendError> {
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), dto::Value::string(&doc.id));
        fields.insert("title".to_string(), dto::Value::string(&doc.title));
        fields.insert("completed".to_string(), dto::Value::boolean(doc.completed));
        fields.insert("priority".to_string(), dto::Value::string(doc.priority.as_str()));
        fields.insert("status".to_string(), dto::Value::string(doc.status.as_str()));

        let write = dto::Write {
            update: dto::Document {
                name: self.document_name(&doc.id),
                fields,
                create_time: None,
                update_time: None,
            },
            update_mask: None,
            update_transforms: vec![
                dto::FieldTransform::request_time("createdAt"),
                dto::FieldTransform::request_time("updatedAt"),
            ],
            current_document: Some(dto::Precondition { exists: false }),
        };

        self.commit(write).await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), BackendError> {
        let fields = patch_fields(patch);
        let mut field_paths: Vec<String> = fields.keys().cloned().collect();
        field_paths.sort();

        let write = dto::Write {
            update: dto::Document {
                name: self.document_name(id),
                fields,
                create_time: None,
                update_time: None,
            },
            update_mask: Some(dto::DocumentMask { field_paths }),
            update_transforms: vec![dto::FieldTransform::request_time("updatedAt")],
            current_document: Some(dto::Precondition { exists: true }),
        };

        self.commit(write).await.map_err(missing_document)
    }

    async fn delete_task(&self, id: &str) -> Result<(), BackendError> {
        let url = self.url(&self.document_name(id));
        let response = self.authorize(self.client.delete(&url)).send().await?;
        check_status(response).await.map_err(missing_document)?;
        Ok(())
    }
}

/// Only the fields the patch carries, so untouched fields are never written.
fn patch_fields(patch: &TaskPatch) -> HashMap<String, dto::Value> {
    let mut fields = HashMap::new();
    if let Some(title) = &patch.title {
        fields.insert("title".to_string(), dto::Value::string(title));
    }
    if let Some(completed) = patch.completed {
        fields.insert("completed".to_string(), dto::Value::boolean(completed));
    }
    if let Some(priority) = patch.priority {
        fields.insert("priority".to_string(), dto::Value::string(priority.as_str()));
    }
    if let Some(status) = patch.status {
        fields.insert("status".to_string(), dto::Value::string(status.as_str()));
    }
    fields
}

fn parse_document(document: dto::Document) -> Result<RawTaskDocument, BackendError> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BackendError::Decode(format!("bad document name: {}", document.name)))?;

    let fields = document.fields;
    let string = |key: &str| fields.get(key).and_then(|v| v.string_value.clone());
    let timestamp = |key: &str| {
        fields
            .get(key)
            .and_then(|v| v.timestamp_value.as_deref())
            .and_then(parse_timestamp)
    };

    Ok(RawTaskDocument {
        title: string("title"),
        completed: fields.get("completed").and_then(|v| v.boolean_value),
        priority: string("priority"),
        status: string("status"),
        created_at: timestamp("createdAt")
            .or_else(|| document.create_time.as_deref().and_then(parse_timestamp)),
        updated_at: timestamp("updatedAt")
            .or_else(|| document.update_time.as_deref().and_then(parse_timestamp)),
        id,
    })
}

/// Parse RFC3339 timestamp to comparable format
fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<dto::ErrorResponse>(&body) {
        Ok(parsed) if parsed.error.status.is_empty() => parsed.error.message,
        Ok(parsed) => format!("{} ({})", parsed.error.message, parsed.error.status),
        Err(_) => body,
    };
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

fn missing_document(err: BackendError) -> BackendError {
    match err {
        BackendError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
            BackendError::NotFound
        }
        other => other,
    }
}
