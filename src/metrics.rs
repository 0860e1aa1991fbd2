use std::sync::atomic::{AtomicU64, Ordering};

use crate::chunking::ChunkStatistics;

/// Process-wide counters for the ingestion pipeline.
#[derive(Default)]
pub struct IngestMetrics {
    documents: AtomicU64,
    empty_documents: AtomicU64,
    failed_documents: AtomicU64,
    large_chunks: AtomicU64,
    small_chunks: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one chunked document.
    pub fn record_document(&self, statistics: &ChunkStatistics) {
        self.documents.fetch_add(1, Ordering::Relaxed);
        if statistics.total_chunks == 0 {
            self.empty_documents.fetch_add(1, Ordering::Relaxed);
        }
        self.large_chunks
            .fetch_add(statistics.large_chunks as u64, Ordering::Relaxed);
        self.small_chunks
            .fetch_add(statistics.small_chunks as u64, Ordering::Relaxed);
    }

    /// Account for a document whose chunks never reached the store.
    pub fn record_failure(&self) {
        self.failed_documents.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let large_chunks = self.large_chunks.load(Ordering::Relaxed);
        let small_chunks = self.small_chunks.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_chunked: self.documents.load(Ordering::Relaxed),
            empty_documents: self.empty_documents.load(Ordering::Relaxed),
            failed_documents: self.failed_documents.load(Ordering::Relaxed),
            chunks_emitted: large_chunks + small_chunks,
            large_chunks,
            small_chunks,
        }
    }
}

/// Point-in-time copy of [`IngestMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents run through a chunking engine.
    pub documents_chunked: u64,
    /// Documents that produced no chunks and need an external fallback.
    pub empty_documents: u64,
    /// Documents whose store write failed.
    pub failed_documents: u64,
    /// All chunks emitted.
    pub chunks_emitted: u64,
    /// Page and slide summaries.
    pub large_chunks: u64,
    /// Everything linked under a summary.
    pub small_chunks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(large: usize, small: usize) -> ChunkStatistics {
        ChunkStatistics {
            total_chunks: large + small,
            large_chunks: large,
            small_chunks: small,
            ..ChunkStatistics::default()
        }
    }

    #[test]
    fn accumulates_chunk_counts() {
        let metrics = IngestMetrics::new();
        metrics.record_document(&stats(2, 7));
        metrics.record_document(&stats(1, 3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_chunked, 2);
        assert_eq!(snapshot.large_chunks, 3);
        assert_eq!(snapshot.small_chunks, 10);
        assert_eq!(snapshot.chunks_emitted, 13);
        assert_eq!(snapshot.empty_documents, 0);
    }

    #[test]
    fn empty_and_failed_documents_are_counted() {
        let metrics = IngestMetrics::new();
        metrics.record_document(&stats(0, 0));
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.empty_documents, 1);
        assert_eq!(snapshot.failed_documents, 1);
        assert_eq!(snapshot.chunks_emitted, 0);
    }
}
