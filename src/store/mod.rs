//! Vector store seam between the chunking engines and persistence.
//!
//! The engines never delete anything themselves. Re-chunking a document is expressed as
//! `add_documents(new_chunks)` followed by `delete_stale(file_name, new_ids)`, so a failed
//! write leaves the previous chunks in place.

mod memory;
mod qdrant;

pub use memory::ChunkStore;
pub use qdrant::{QdrantError, QdrantStore};

use async_trait::async_trait;
use thiserror::Error;

use crate::embedding::EmbeddingClientError;
use crate::model::StoredChunk;

/// Errors raised by vector store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Qdrant request failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Embedding vectors could not be produced.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// A chunk references a parent that is not an earlier Large chunk of its document.
    #[error("rejected chunk batch: {0}")]
    InvalidRecord(String),
}

/// Ingestion interface implemented by every chunk store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist chunks in the given order.
    async fn add_documents(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError>;

    /// Remove every chunk whose `source_file` equals `file_name`.
    async fn delete_document(&self, file_name: &str) -> Result<(), StoreError>;

    /// Remove the chunks of `file_name` whose id is not in `keep`.
    async fn delete_stale(&self, file_name: &str, keep: &[String]) -> Result<(), StoreError>;
}
