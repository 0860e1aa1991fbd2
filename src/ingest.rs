//! Ingestion service coordinating the chunking engines and a vector store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::chunking::{ChunkStatistics, get_chunk_statistics};
use crate::config::{ChunkingOptions, Config};
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::model::{Chunk, ChunkRecord, DocumentRef, PptxChunk, StoredChunk};
use crate::pdf::PdfChunker;
use crate::pptx::PptxChunker;
use crate::store::{StoreError, VectorStore};
use crate::vision::{SlideRenderer, VisionClient, build_vision_client, select_renderer};

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File extension is neither `.pdf` nor `.pptx`.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(PathBuf),
    /// Chunking task could not complete.
    #[error("chunking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Vector store rejected the write.
    #[error("vector store request failed: {0}")]
    Store(#[from] StoreError),
}

/// Document formats with a chunking engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format.
    Pdf,
    /// PowerPoint Open XML presentation.
    Pptx,
}

impl DocumentKind {
    /// Kind from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }
}

/// Chunks of one document, typed by family.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DocumentChunks {
    /// Page chunks.
    Pdf(Vec<Chunk>),
    /// Slide chunks.
    Pptx(Vec<PptxChunk>),
}

impl DocumentChunks {
    /// Number of chunks.
    pub fn len(&self) -> usize {
        match self {
            Self::Pdf(chunks) => chunks.len(),
            Self::Pptx(chunks) => chunks.len(),
        }
    }

    /// Whether the engine produced nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate statistics.
    pub fn statistics(&self) -> ChunkStatistics {
        match self {
            Self::Pdf(chunks) => get_chunk_statistics(chunks),
            Self::Pptx(chunks) => get_chunk_statistics(chunks),
        }
    }

    /// Family-independent records for a vector store.
    pub fn to_stored(&self) -> Vec<StoredChunk> {
        match self {
            Self::Pdf(chunks) => chunks.iter().map(ChunkRecord::to_stored).collect(),
            Self::Pptx(chunks) => chunks.iter().map(ChunkRecord::to_stored).collect(),
        }
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Source file name used as the store key.
    pub file_name: String,
    /// Detected format.
    pub kind: DocumentKind,
    /// Chunks written to the store.
    pub chunk_count: usize,
    /// Large summary chunks among them.
    pub large_chunks: usize,
}

/// Routes documents to their engine and supersedes previous chunks in the store.
///
/// Construct once and share through an `Arc`; engines hold only immutable options.
pub struct IngestService {
    pdf: PdfChunker,
    pptx: PptxChunker,
    store: Arc<dyn VectorStore>,
    metrics: Arc<IngestMetrics>,
}

impl IngestService {
    /// Build a service with explicit options for each engine.
    pub fn new(
        pdf_options: ChunkingOptions,
        pptx_options: ChunkingOptions,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            pdf: PdfChunker::new(pdf_options),
            pptx: PptxChunker::new(pptx_options),
            store,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Build a service from loaded configuration, wiring vision when it is enabled.
    pub fn from_config(config: &Config, store: Arc<dyn VectorStore>) -> Self {
        let service = Self::new(config.pdf.clone(), config.pptx.clone(), store);
        if !config.vision.enabled {
            return service;
        }
        match build_vision_client(&config.vision) {
            Ok(client) => service.with_vision(client, select_renderer()),
            Err(error) => {
                tracing::warn!(error = %error, "Vision client unavailable; slide summaries stay text-only");
                service
            }
        }
    }

    /// Attach a vision backend to the presentation engine.
    pub fn with_vision(
        mut self,
        client: Arc<dyn VisionClient>,
        renderer: Arc<dyn SlideRenderer>,
    ) -> Self {
        self.pptx = self.pptx.with_vision(client, renderer);
        self
    }

    /// Chunk a document without touching the store.
    pub async fn chunk_document(
        &self,
        path: &Path,
        use_vision: bool,
    ) -> Result<DocumentChunks, IngestError> {
        match DocumentKind::from_path(path) {
            Some(DocumentKind::Pdf) => {
                let chunker = self.pdf.clone();
                let owned = path.to_path_buf();
                let chunks = tokio::task::spawn_blocking(move || chunker.chunk_pdf(&owned)).await?;
                Ok(DocumentChunks::Pdf(chunks))
            }
            Some(DocumentKind::Pptx) => Ok(DocumentChunks::Pptx(
                self.pptx.chunk_pptx(path, use_vision).await,
            )),
            None => Err(IngestError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Chunk a document and replace its previous chunks in the store.
    ///
    /// An empty chunk list leaves the stored chunks untouched so the caller can apply an
    /// external fallback.
    pub async fn ingest(&self, path: &Path, use_vision: bool) -> Result<IngestOutcome, IngestError> {
        let kind = DocumentKind::from_path(path)
            .ok_or_else(|| IngestError::UnsupportedFormat(path.to_path_buf()))?;
        let chunks = self.chunk_document(path, use_vision).await?;
        let statistics = chunks.statistics();
        let records = chunks.to_stored();
        self.metrics.record_document(&statistics);

        let file_name = records.first().map_or_else(
            || DocumentRef::from_path(path).source_file,
            |record| record.source_file.clone(),
        );
        let outcome = IngestOutcome {
            file_name,
            kind,
            chunk_count: records.len(),
            large_chunks: statistics.large_chunks,
        };

        if records.is_empty() {
            tracing::warn!(file = %outcome.file_name, "No chunks produced; store left unchanged");
            return Ok(outcome);
        }

        if let Err(error) = self.replace(&outcome.file_name, records).await {
            self.metrics.record_failure();
            return Err(error);
        }
        tracing::info!(
            file = %outcome.file_name,
            kind = ?kind,
            chunks = outcome.chunk_count,
            large_chunks = outcome.large_chunks,
            "Document ingested"
        );
        Ok(outcome)
    }

    /// Store the new chunks, then drop the document's older ones. A failed add leaves the
    /// previous chunks untouched.
    async fn replace(&self, file_name: &str, records: Vec<StoredChunk>) -> Result<(), IngestError> {
        let keep: Vec<String> = records.iter().map(|record| record.id.clone()).collect();
        self.store.add_documents(records).await?;
        self.store.delete_stale(file_name, &keep).await?;
        Ok(())
    }

    /// Remove a document's chunks from the store.
    pub async fn delete(&self, file_name: &str) -> Result<(), IngestError> {
        self.store.delete_document(file_name).await?;
        Ok(())
    }

    /// Current ingestion counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
