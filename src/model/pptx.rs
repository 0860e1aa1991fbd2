//! Slide chunk records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::profile::{ContentProfile, current_timestamp_rfc3339};
use super::record::{ChunkFactory, ChunkKind, ChunkRecord, to_object};
use super::{ChunkInvariantError, DocumentRef, new_chunk_id};

/// Chunk types produced for presentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PptxChunkType {
    /// Large chunk holding the slide text, optionally with a vision analysis.
    SlideSummary,
    /// Title placeholder text.
    SlideTitle,
    /// Speaker notes.
    SlideNotes,
    /// Fallback split of speaker notes.
    SlideNotesSegment,
    /// Top-level bullet with its nested children.
    BulletGroup,
    /// Fallback split of a bullet group.
    BulletGroupSegment,
    /// Whole table as Markdown.
    TableFull,
    /// One table row with header labels.
    TableRow,
    /// One table column with its values.
    TableColumn,
    /// Explicit key/value lines for an itemised row.
    TableKeyValue,
}

impl ChunkKind for PptxChunkType {
    fn as_str(self) -> &'static str {
        match self {
            Self::SlideSummary => "slide_summary",
            Self::SlideTitle => "slide_title",
            Self::SlideNotes => "slide_notes",
            Self::SlideNotesSegment => "slide_notes_segment",
            Self::BulletGroup => "bullet_group",
            Self::BulletGroupSegment => "bullet_group_segment",
            Self::TableFull => "table_full",
            Self::TableRow => "table_row",
            Self::TableColumn => "table_column",
            Self::TableKeyValue => "table_key_value",
        }
    }

    fn weight(self) -> f32 {
        match self {
            Self::SlideSummary => 0.5,
            Self::SlideTitle => 1.5,
            Self::SlideNotes => 0.8,
            Self::BulletGroup => 1.0,
            Self::TableFull => 1.2,
            Self::TableRow => 1.3,
            Self::TableColumn => 1.1,
            Self::TableKeyValue => 1.5,
            Self::SlideNotesSegment => Self::SlideNotes.weight() * 0.9,
            Self::BulletGroupSegment => Self::BulletGroup.weight() * 0.9,
        }
    }

    fn segment(self) -> Self {
        match self {
            Self::SlideNotes | Self::SlideNotesSegment => Self::SlideNotesSegment,
            Self::BulletGroup | Self::BulletGroupSegment => Self::BulletGroupSegment,
            other => other,
        }
    }

    fn is_large(self) -> bool {
        matches!(self, Self::SlideSummary)
    }

    fn is_fallback_processed(self) -> bool {
        matches!(
            self,
            Self::SlideNotes
                | Self::SlideNotesSegment
                | Self::BulletGroup
                | Self::BulletGroupSegment
        )
    }
}

/// Position of a table-derived chunk inside its source table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCellInfo {
    /// `slide{n}_table{k}` identifier shared by every granularity of one table.
    pub table_id: String,
    /// Slide title used as the table caption.
    pub table_title: Option<String>,
    /// Header cells, row 0 of the grid.
    pub header_row: Vec<String>,
    /// Row of the chunk, for row and key/value granularities.
    pub row_index: Option<usize>,
    /// Column of the chunk, for the column granularity.
    pub col_index: Option<usize>,
    /// Spreadsheet-style reference such as `B` or `R3`.
    pub cell_reference: Option<String>,
    /// Number captured from an `항목 N` cell.
    pub item_number: Option<u32>,
    /// `budget`, `sales`, `performance`, `schedule` or `general`.
    pub data_type: String,
    /// Rows in the grid including the header.
    pub row_count: usize,
    /// Columns in the widest row.
    pub col_count: usize,
    /// Whether the chunk is the header row.
    pub is_header_row: bool,
}

/// Metadata attached to every slide chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PptxChunkMetadata {
    /// Identifier shared by every chunk of the source presentation.
    pub document_id: String,
    /// Source file name.
    pub source_file: String,
    /// 1-based slide number.
    pub slide_number: usize,
    /// Enclosing `slide_summary` chunk.
    pub parent_chunk_id: Option<String>,
    /// Title placeholder text of the slide.
    pub slide_title: Option<String>,
    /// Retrieval-priority multiplier fixed by the chunk type.
    pub chunk_type_weight: f32,
    /// Minimum indentation level of a bullet group.
    pub bullet_level: Option<u32>,
    /// Whether the slide carries speaker notes.
    pub has_notes: bool,
    /// Kind of shape the chunk came from.
    pub shape_type: Option<String>,
    /// Table position for table-derived chunks.
    #[serde(flatten, default)]
    pub table: Option<TableCellInfo>,
    /// Derived counts and feature flags.
    #[serde(flatten)]
    pub profile: ContentProfile,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl PptxChunkMetadata {
    /// Base metadata for chunks of one slide.
    pub fn for_slide(document: &DocumentRef, slide_number: usize) -> Self {
        Self {
            document_id: document.document_id.clone(),
            source_file: document.source_file.clone(),
            slide_number,
            parent_chunk_id: None,
            slide_title: None,
            chunk_type_weight: 1.0,
            bullet_level: None,
            has_notes: false,
            shape_type: None,
            table: None,
            profile: ContentProfile::derive(""),
            created_at: String::new(),
        }
    }
}

/// Slide chunk record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PptxChunk {
    id: String,
    content: String,
    chunk_type: PptxChunkType,
    metadata: PptxChunkMetadata,
}

impl PptxChunk {
    /// Chunk identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chunk text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Chunk type.
    pub fn chunk_type(&self) -> PptxChunkType {
        self.chunk_type
    }

    /// Chunk metadata.
    pub fn metadata(&self) -> &PptxChunkMetadata {
        &self.metadata
    }

    /// Re-derive the content profile and compare it to the stored one.
    pub fn validate(&self) -> Result<(), ChunkInvariantError> {
        if self.metadata.profile != ContentProfile::derive(&self.content) {
            return Err(ChunkInvariantError::StaleProfile(self.id.clone()));
        }
        let expected = self.chunk_type.weight();
        if (self.metadata.chunk_type_weight - expected).abs() > f32::EPSILON {
            return Err(ChunkInvariantError::WrongWeight {
                id: self.id.clone(),
                expected,
                actual: self.metadata.chunk_type_weight,
            });
        }
        Ok(())
    }

    /// Build a chunk of the given type.
    pub fn new(content: String, chunk_type: PptxChunkType, metadata: PptxChunkMetadata) -> Self {
        Self::assemble(content, chunk_type, metadata)
    }
}

impl ChunkFactory for PptxChunk {
    type Kind = PptxChunkType;
    type Metadata = PptxChunkMetadata;

    fn assemble(content: String, kind: PptxChunkType, mut metadata: PptxChunkMetadata) -> Self {
        metadata.chunk_type_weight = kind.weight();
        metadata.profile = ContentProfile::derive(&content);
        if metadata.created_at.is_empty() {
            metadata.created_at = current_timestamp_rfc3339();
        }
        Self {
            id: new_chunk_id(),
            content,
            chunk_type: kind,
            metadata,
        }
    }
}

impl ChunkRecord for PptxChunk {
    fn id(&self) -> &str {
        &self.id
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn type_name(&self) -> &'static str {
        self.chunk_type.as_str()
    }

    fn is_large(&self) -> bool {
        self.chunk_type.is_large()
    }

    fn parent_chunk_id(&self) -> Option<&str> {
        self.metadata.parent_chunk_id.as_deref()
    }

    fn document_id(&self) -> &str {
        &self.metadata.document_id
    }

    fn source_file(&self) -> &str {
        &self.metadata.source_file
    }

    fn unit_number(&self) -> usize {
        self.metadata.slide_number
    }

    fn section(&self) -> Option<&str> {
        self.metadata.slide_title.as_deref()
    }

    fn word_count(&self) -> usize {
        self.metadata.profile.word_count
    }

    fn char_count(&self) -> usize {
        self.metadata.profile.char_count
    }

    fn metadata_map(&self) -> Map<String, Value> {
        to_object(&self.metadata)
    }
}
