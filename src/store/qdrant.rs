//! Qdrant-backed chunk store over the REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use super::{StoreError, VectorStore};
use crate::embedding::EmbeddingClient;
use crate::model::StoredChunk;

const EMBED_BATCH: usize = 64;
const KEYWORD_FIELDS: [&str; 4] = ["source_file", "document_id", "chunk_type", "parent_chunk_id"];

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

#[derive(Deserialize)]
struct RetrieveResponse {
    result: Vec<RetrievedPoint>,
}

#[derive(Deserialize)]
struct RetrievedPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

/// Chunk store that embeds content and upserts one point per chunk.
pub struct QdrantStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QdrantStore {
    /// Build a store for `collection` on the Qdrant instance at `url`.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("rusty-rag/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|key| !key.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
            embedder,
        })
    }

    /// Collection written to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection with cosine distance when it is missing, then ensure payload
    /// indexes for the filterable fields.
    pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
        if !self.collection_exists().await? {
            let body = json!({
                "vectors": {
                    "size": self.embedder.dimension(),
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}", self.collection))
                .json(&body)
                .send()
                .await?;
            ensure_success(response).await?;
            tracing::info!(
                collection = %self.collection,
                vector_size = self.embedder.dimension(),
                "Created collection"
            );
        }

        for field in KEYWORD_FIELDS {
            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await?;
            let status = response.status();
            if status.is_success() || status == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, "Payload index ensured");
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    collection = %self.collection,
                    field,
                    %status,
                    body = %body,
                    "Failed to ensure payload index"
                );
            }
        }
        Ok(())
    }

    /// Fetch stored chunk payloads by id, e.g. to expand Small hits to their Large parents.
    pub async fn fetch_payloads(
        &self,
        ids: &[String],
    ) -> Result<Vec<(String, Map<String, Value>)>, QdrantError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .request(Method::POST, &format!("collections/{}/points", self.collection))
            .json(&json!({ "ids": ids, "with_payload": true, "with_vector": false }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(QdrantError::UnexpectedStatus { status, body });
        }
        let RetrieveResponse { result } = response.json().await?;
        Ok(result
            .into_iter()
            .filter_map(|point| Some((stringify_point_id(point.id), point.payload?)))
            .collect())
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QdrantError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn delete_points(&self, body: Value) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("api-key", api_key);
        }
        request
    }
}

fn point_payload(chunk: StoredChunk) -> Map<String, Value> {
    let mut payload = chunk.metadata;
    payload.insert("content".into(), Value::String(chunk.content));
    payload.insert("chunk_type".into(), Value::String(chunk.chunk_type));
    payload.insert("document_id".into(), Value::String(chunk.document_id));
    payload.insert("source_file".into(), Value::String(chunk.source_file));
    payload.insert(
        "parent_chunk_id".into(),
        chunk.parent_chunk_id.map(Value::String).unwrap_or(Value::Null),
    );
    payload
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add_documents(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let total = chunks.len();
        let mut remaining = chunks.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<StoredChunk> = remaining.by_ref().take(EMBED_BATCH).collect();
            let texts = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self.embedder.generate_embeddings(texts).await?;
            let points: Vec<Value> = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| {
                    json!({
                        "id": chunk.id.clone(),
                        "vector": vector,
                        "payload": point_payload(chunk),
                    })
                })
                .collect();

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/points", self.collection),
                )
                .query(&[("wait", true)])
                .json(&json!({ "points": points }))
                .send()
                .await
                .map_err(QdrantError::from)?;
            ensure_success(response).await?;
        }
        tracing::info!(collection = %self.collection, points = total, "Chunks upserted");
        Ok(())
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), StoreError> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": "source_file", "match": { "value": file_name } }
                ]
            }
        });
        self.delete_points(body).await?;
        tracing::info!(collection = %self.collection, file = file_name, "Document chunks deleted");
        Ok(())
    }

    async fn delete_stale(&self, file_name: &str, keep: &[String]) -> Result<(), StoreError> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": "source_file", "match": { "value": file_name } }
                ],
                "must_not": [
                    { "has_id": keep }
                ]
            }
        });
        self.delete_points(body).await?;
        tracing::info!(
            collection = %self.collection,
            file = file_name,
            kept = keep.len(),
            "Stale document chunks deleted"
        );
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), QdrantError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = QdrantError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Qdrant request failed");
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
