//! Chunk records emitted by the chunking engines.
//!
//! Two families exist: [`Chunk`] for PDF pages and [`PptxChunk`] for slides. Both are built
//! once through their factories and never mutated afterwards; counts and feature flags are
//! derived from the content by [`ContentProfile::derive`] at build time and can be re-checked
//! with `validate`.

mod chunk;
mod pptx;
mod profile;
mod record;

pub use chunk::{Chunk, ChunkMetadata, ChunkType};
pub use pptx::{PptxChunk, PptxChunkMetadata, PptxChunkType, TableCellInfo};
pub use profile::{ContentProfile, char_count, word_count};
pub use record::{
    ChunkFactory, ChunkKind, ChunkRecord, DanglingParent, StoredChunk, verify_parent_links,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// Axis-aligned box in page units, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub top: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl BoundingBox {
    /// Smallest box covering both inputs.
    pub fn union(self, other: Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            top: self.top.min(other.top),
            x1: self.x1.max(other.x1),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Whether the point lies inside the box, inclusive, with a tolerance.
    pub fn contains(&self, x: f32, y: f32, tolerance: f32) -> bool {
        x >= self.x0 - tolerance
            && x <= self.x1 + tolerance
            && y >= self.top - tolerance
            && y <= self.bottom + tolerance
    }
}

/// Identity of the source document shared by all of its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Opaque identifier derived from the file name.
    pub document_id: String,
    /// File name used to supersede the document in a vector store.
    pub source_file: String,
}

impl DocumentRef {
    /// Derive the identity from a filesystem path.
    pub fn from_path(path: &Path) -> Self {
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_file_name(&source_file)
    }

    /// Derive the identity from a bare file name.
    pub fn from_file_name(file_name: &str) -> Self {
        let digest = Sha256::digest(file_name.as_bytes());
        let mut document_id = hex::encode(digest);
        document_id.truncate(16);
        Self {
            document_id,
            source_file: file_name.to_string(),
        }
    }
}

/// Stored counts or flags disagree with the chunk content.
#[derive(Debug, Error, PartialEq)]
pub enum ChunkInvariantError {
    /// Counts or feature flags were not derived from the current content.
    #[error("chunk {0} carries a content profile that does not match its content")]
    StaleProfile(String),
    /// Weight differs from the fixed weight of the chunk type.
    #[error("chunk {id} has weight {actual}, expected {expected}")]
    WrongWeight {
        /// Chunk identifier.
        id: String,
        /// Weight fixed by the chunk type.
        expected: f32,
        /// Weight stored on the chunk.
        actual: f32,
    },
}

pub(crate) fn new_chunk_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ref_is_stable_for_same_name() {
        let a = DocumentRef::from_path(Path::new("/tmp/a/report.pdf"));
        let b = DocumentRef::from_path(Path::new("/other/report.pdf"));
        assert_eq!(a, b);
        assert_eq!(a.document_id.len(), 16);
        assert_eq!(a.source_file, "report.pdf");
    }

    #[test]
    fn bounding_box_union_and_contains() {
        let a = BoundingBox {
            x0: 10.0,
            top: 10.0,
            x1: 20.0,
            bottom: 20.0,
        };
        let b = BoundingBox {
            x0: 15.0,
            top: 5.0,
            x1: 40.0,
            bottom: 12.0,
        };
        let merged = a.union(b);
        assert_eq!(merged.x0, 10.0);
        assert_eq!(merged.top, 5.0);
        assert_eq!(merged.x1, 40.0);
        assert!(merged.contains(39.0, 19.0, 0.0));
        assert!(!merged.contains(41.0, 19.0, 0.5));
    }
}
