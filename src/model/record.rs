//! Traits shared by the PDF and PPTX chunk families.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Chunk type vocabulary of one chunk family.
pub trait ChunkKind: Copy + std::fmt::Debug {
    /// Stable snake_case name stored with the chunk.
    fn as_str(self) -> &'static str;
    /// Retrieval-priority multiplier for this type.
    fn weight(self) -> f32;
    /// The `<type>_segment` variant produced by fallback splitting.
    fn segment(self) -> Self;
    /// Whether this type is a Large summary chunk.
    fn is_large(self) -> bool;
    /// Whether the minimum size/word thresholds apply to chunks of this type.
    fn is_fallback_processed(self) -> bool;
}

/// Read-only view over any emitted chunk.
pub trait ChunkRecord {
    /// Globally unique chunk identifier.
    fn id(&self) -> &str;
    /// Chunk text.
    fn content(&self) -> &str;
    /// Snake_case chunk type.
    fn type_name(&self) -> &'static str;
    /// Whether the chunk is a Large summary chunk.
    fn is_large(&self) -> bool;
    /// Identifier of the enclosing Large chunk, if any.
    fn parent_chunk_id(&self) -> Option<&str>;
    /// Identifier shared by every chunk of the same source document.
    fn document_id(&self) -> &str;
    /// Source file name, used to supersede a document's chunks.
    fn source_file(&self) -> &str;
    /// Page or slide number (1-based).
    fn unit_number(&self) -> usize;
    /// Section or slide title in effect for the chunk.
    fn section(&self) -> Option<&str>;
    /// Stored word count.
    fn word_count(&self) -> usize;
    /// Stored character count.
    fn char_count(&self) -> usize;
    /// Flattened metadata for storage payloads.
    fn metadata_map(&self) -> Map<String, Value>;

    /// Convert into the family-independent record handed to a vector store.
    fn to_stored(&self) -> StoredChunk {
        StoredChunk {
            id: self.id().to_string(),
            content: self.content().to_string(),
            chunk_type: self.type_name().to_string(),
            document_id: self.document_id().to_string(),
            source_file: self.source_file().to_string(),
            parent_chunk_id: self.parent_chunk_id().map(str::to_string),
            metadata: self.metadata_map(),
        }
    }
}

/// Chunk family that the fallback engine can build records for.
pub trait ChunkFactory: ChunkRecord + Sized {
    /// Chunk type vocabulary.
    type Kind: ChunkKind;
    /// Metadata record cloned into every chunk.
    type Metadata: Clone;

    /// Build a chunk, deriving counts and feature flags from `content`.
    fn assemble(content: String, kind: Self::Kind, metadata: Self::Metadata) -> Self;
}

/// Family-independent chunk record stored by vector stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChunk {
    /// Chunk identifier.
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Snake_case chunk type.
    pub chunk_type: String,
    /// Document identifier.
    pub document_id: String,
    /// Source file name.
    pub source_file: String,
    /// Parent Large chunk identifier.
    pub parent_chunk_id: Option<String>,
    /// Remaining metadata fields.
    pub metadata: Map<String, Value>,
}

/// Parent link that does not resolve to an earlier Large chunk of the same document.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("chunk {chunk_id} references {parent_id}, which is not an earlier Large chunk of its document")]
pub struct DanglingParent {
    /// Chunk carrying the bad reference.
    pub chunk_id: String,
    /// Referenced identifier.
    pub parent_id: String,
}

/// Check that every parent link points at a Large chunk emitted earlier for the same document.
pub fn verify_parent_links<C: ChunkRecord>(chunks: &[C]) -> Result<(), DanglingParent> {
    let mut large_seen: HashSet<(&str, &str)> = HashSet::new();
    for chunk in chunks {
        if let Some(parent) = chunk.parent_chunk_id()
            && !large_seen.contains(&(chunk.document_id(), parent))
        {
            return Err(DanglingParent {
                chunk_id: chunk.id().to_string(),
                parent_id: parent.to_string(),
            });
        }
        if chunk.is_large() {
            large_seen.insert((chunk.document_id(), chunk.id()));
        }
    }
    Ok(())
}

pub(crate) fn to_object<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => Map::new(),
    }
}
