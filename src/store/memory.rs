use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, VectorStore};
use crate::model::StoredChunk;

const LARGE_CHUNK_TYPES: [&str; 2] = ["page_summary", "slide_summary"];

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, StoredChunk>,
    order: Vec<String>,
}

/// In-memory, id-keyed chunk store that resolves Small-to-Large links.
#[derive(Default)]
pub struct ChunkStore {
    inner: RwLock<Inner>,
}

impl ChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Whether the store holds no chunk.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Chunk by id.
    pub async fn get(&self, id: &str) -> Option<StoredChunk> {
        self.inner.read().await.chunks.get(id).cloned()
    }

    /// Large chunk a Small chunk points at.
    pub async fn parent_of(&self, id: &str) -> Option<StoredChunk> {
        let inner = self.inner.read().await;
        let parent = inner.chunks.get(id)?.parent_chunk_id.as_deref()?;
        inner.chunks.get(parent).cloned()
    }

    /// Small chunks of a Large chunk, in insertion order.
    pub async fn children_of(&self, parent_id: &str) -> Vec<StoredChunk> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.chunks.get(id))
            .filter(|chunk| chunk.parent_chunk_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    /// Every chunk of one source file, in insertion order.
    pub async fn document_chunks(&self, file_name: &str) -> Vec<StoredChunk> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.chunks.get(id))
            .filter(|chunk| chunk.source_file == file_name)
            .cloned()
            .collect()
    }

    async fn retain(&self, mut keep: impl FnMut(&StoredChunk) -> bool) -> usize {
        let mut inner = self.inner.write().await;
        let Inner { chunks, order } = &mut *inner;
        order.retain(|id| {
            let kept = chunks.get(id).is_some_and(&mut keep);
            if !kept {
                chunks.remove(id);
            }
            kept
        });
        order.len()
    }
}

fn is_large(chunk: &StoredChunk) -> bool {
    LARGE_CHUNK_TYPES.contains(&chunk.chunk_type.as_str())
}

#[async_trait]
impl VectorStore for ChunkStore {
    async fn add_documents(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        for (position, chunk) in chunks.iter().enumerate() {
            let Some(parent_id) = chunk.parent_chunk_id.as_deref() else {
                continue;
            };
            let resolves = chunks[..position]
                .iter()
                .chain(inner.chunks.get(parent_id))
                .any(|candidate| {
                    candidate.id == parent_id
                        && is_large(candidate)
                        && candidate.document_id == chunk.document_id
                });
            if !resolves {
                return Err(StoreError::InvalidRecord(format!(
                    "chunk {} references unknown parent {parent_id}",
                    chunk.id
                )));
            }
        }

        let added = chunks.len();
        for chunk in chunks {
            if inner.chunks.insert(chunk.id.clone(), chunk.clone()).is_none() {
                inner.order.push(chunk.id);
            }
        }
        tracing::debug!(added, total = inner.order.len(), "Stored chunks in memory");
        Ok(())
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), StoreError> {
        let remaining = self.retain(|chunk| chunk.source_file != file_name).await;
        tracing::debug!(file = file_name, remaining, "Deleted document chunks");
        Ok(())
    }

    async fn delete_stale(&self, file_name: &str, keep: &[String]) -> Result<(), StoreError> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let remaining = self
            .retain(|chunk| chunk.source_file != file_name || keep.contains(chunk.id.as_str()))
            .await;
        tracing::debug!(file = file_name, remaining, "Deleted stale document chunks");
        Ok(())
    }
}
