//! PDF chunk records and factories.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::profile::{ContentProfile, current_timestamp_rfc3339};
use super::record::{ChunkFactory, ChunkKind, ChunkRecord, to_object};
use super::{BoundingBox, ChunkInvariantError, DocumentRef, new_chunk_id};

/// Chunk types produced for PDF documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Heading or numbered section line.
    Title,
    /// Body text.
    Paragraph,
    /// Group of contiguous list items.
    List,
    /// Markdown-rendered table.
    Table,
    /// Large chunk holding the whole page text.
    PageSummary,
    /// Fallback split of a title.
    TitleSegment,
    /// Fallback split of a paragraph.
    ParagraphSegment,
    /// Fallback split of a list.
    ListSegment,
    /// Fallback split of a table.
    TableSegment,
}

const SEGMENT_WEIGHT_FACTOR: f32 = 0.9;

impl ChunkKind for ChunkType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Paragraph => "paragraph",
            Self::List => "list",
            Self::Table => "table",
            Self::PageSummary => "page_summary",
            Self::TitleSegment => "title_segment",
            Self::ParagraphSegment => "paragraph_segment",
            Self::ListSegment => "list_segment",
            Self::TableSegment => "table_segment",
        }
    }

    fn weight(self) -> f32 {
        match self {
            Self::Title => 1.5,
            Self::Paragraph => 1.0,
            Self::List => 1.1,
            Self::Table => 1.3,
            Self::PageSummary => 1.0,
            Self::TitleSegment => Self::Title.weight() * SEGMENT_WEIGHT_FACTOR,
            Self::ParagraphSegment => Self::Paragraph.weight() * SEGMENT_WEIGHT_FACTOR,
            Self::ListSegment => Self::List.weight() * SEGMENT_WEIGHT_FACTOR,
            Self::TableSegment => Self::Table.weight() * SEGMENT_WEIGHT_FACTOR,
        }
    }

    fn segment(self) -> Self {
        match self {
            Self::Title | Self::TitleSegment => Self::TitleSegment,
            Self::Paragraph | Self::ParagraphSegment => Self::ParagraphSegment,
            Self::List | Self::ListSegment => Self::ListSegment,
            Self::Table | Self::TableSegment => Self::TableSegment,
            Self::PageSummary => Self::PageSummary,
        }
    }

    fn is_large(self) -> bool {
        matches!(self, Self::PageSummary)
    }

    fn is_fallback_processed(self) -> bool {
        matches!(
            self,
            Self::Paragraph
                | Self::List
                | Self::ParagraphSegment
                | Self::ListSegment
                | Self::TitleSegment
                | Self::TableSegment
        )
    }
}

/// Metadata attached to every PDF chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Identifier shared by every chunk of the source document.
    pub document_id: String,
    /// Source file name.
    pub source_file: String,
    /// 1-based page number.
    pub page_number: usize,
    /// Enclosing `page_summary` chunk.
    pub parent_chunk_id: Option<String>,
    /// Most recent heading carried forward across pages.
    pub section_title: Option<String>,
    /// Retrieval-priority multiplier fixed by the chunk type.
    pub chunk_type_weight: f32,
    /// Dominant font size of the source element.
    pub font_size: Option<f32>,
    /// Whether the source element used a bold font.
    pub is_bold: bool,
    /// 1 to 4 for headings, from the font size relative to the page median.
    pub heading_level: Option<u8>,
    /// Bounding box of the source element.
    pub coordinates: Option<BoundingBox>,
    /// Derived counts and feature flags.
    #[serde(flatten)]
    pub profile: ContentProfile,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl ChunkMetadata {
    /// Base metadata for chunks of one page; counts are filled in when a chunk is built.
    pub fn for_page(document: &DocumentRef, page_number: usize) -> Self {
        Self {
            document_id: document.document_id.clone(),
            source_file: document.source_file.clone(),
            page_number,
            parent_chunk_id: None,
            section_title: None,
            chunk_type_weight: 1.0,
            font_size: None,
            is_bold: false,
            heading_level: None,
            coordinates: None,
            profile: ContentProfile::derive(""),
            created_at: String::new(),
        }
    }
}

/// PDF chunk record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    id: String,
    content: String,
    chunk_type: ChunkType,
    metadata: ChunkMetadata,
}

impl Chunk {
    /// Chunk identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Chunk text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Chunk type.
    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    /// Chunk metadata.
    pub fn metadata(&self) -> &ChunkMetadata {
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

    /// Heading or section line.
    pub fn title(content: String, metadata: ChunkMetadata) -> Self {
        Self::assemble(content, ChunkType::Title, metadata)
    }

    /// Body text that already satisfies the size constraints.
    pub fn paragraph(content: String, metadata: ChunkMetadata) -> Self {
        Self::assemble(content, ChunkType::Paragraph, metadata)
    }

    /// List group that already satisfies the size constraints.
    pub fn list(content: String, metadata: ChunkMetadata) -> Self {
        Self::assemble(content, ChunkType::List, metadata)
    }

    /// Markdown table.
    pub fn table(content: String, metadata: ChunkMetadata) -> Self {
        Self::assemble(content, ChunkType::Table, metadata)
    }

    /// Large page-level chunk; may be empty.
    pub fn page_summary(content: String, metadata: ChunkMetadata) -> Self {
        Self::assemble(content, ChunkType::PageSummary, metadata)
    }
}

impl ChunkFactory for Chunk {
    type Kind = ChunkType;
    type Metadata = ChunkMetadata;

    fn assemble(content: String, kind: ChunkType, mut metadata: ChunkMetadata) -> Self {
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

impl ChunkRecord for Chunk {
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
        self.metadata.page_number
    }

    fn section(&self) -> Option<&str> {
        self.metadata.section_title.as_deref()
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
