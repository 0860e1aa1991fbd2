use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ChunkRecord;

/// Aggregate view over one emitted chunk sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkStatistics {
    /// Number of chunks.
    pub total_chunks: usize,
    /// Large summary chunks.
    pub large_chunks: usize,
    /// Everything else.
    pub small_chunks: usize,
    /// Counts keyed by snake_case chunk type.
    pub chunks_by_type: BTreeMap<String, usize>,
    /// Mean stored word count.
    pub avg_word_count: f64,
    /// Mean stored character count.
    pub avg_char_count: f64,
    /// Distinct pages or slides covered.
    pub units_covered: usize,
    /// Distinct non-empty section or slide titles.
    pub sections_covered: usize,
}

/// Summarise a chunk sequence without touching it.
pub fn get_chunk_statistics<C: ChunkRecord>(chunks: &[C]) -> ChunkStatistics {
    let mut chunks_by_type = BTreeMap::new();
    let mut units = BTreeSet::new();
    let mut sections = BTreeSet::new();
    let mut words = 0usize;
    let mut chars = 0usize;
    let mut large = 0usize;

    for chunk in chunks {
        *chunks_by_type
            .entry(chunk.type_name().to_string())
            .or_insert(0usize) += 1;
        units.insert(chunk.unit_number());
        if let Some(section) = chunk.section().filter(|section| !section.trim().is_empty()) {
            sections.insert(section);
        }
        words += chunk.word_count();
        chars += chunk.char_count();
        if chunk.is_large() {
            large += 1;
        }
    }

    let total = chunks.len();
    let average = |sum: usize| {
        if total == 0 {
            0.0
        } else {
            sum as f64 / total as f64
        }
    };

    ChunkStatistics {
        total_chunks: total,
        large_chunks: large,
        small_chunks: total - large,
        chunks_by_type,
        avg_word_count: average(words),
        avg_char_count: average(chars),
        units_covered: units.len(),
        sections_covered: sections.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Chunk, ChunkMetadata, DocumentRef};

    #[test]
    fn empty_sequence_has_zero_averages() {
        let stats = get_chunk_statistics::<Chunk>(&[]);
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.avg_word_count, 0.0);
        assert!(stats.chunks_by_type.is_empty());
    }

    #[test]
    fn counts_types_pages_and_sections() {
        let document = DocumentRef::from_file_name("a.pdf");
        let mut page_one = ChunkMetadata::for_page(&document, 1);
        page_one.section_title = Some("Intro".into());
        let page_two = ChunkMetadata::for_page(&document, 2);

        let chunks = vec![
            Chunk::page_summary("one two".into(), page_one.clone()),
            Chunk::title("Intro".into(), page_one),
            Chunk::page_summary(String::new(), page_two),
        ];
        let stats = get_chunk_statistics(&chunks);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.large_chunks, 2);
        assert_eq!(stats.small_chunks, 1);
        assert_eq!(stats.chunks_by_type["page_summary"], 2);
        assert_eq!(stats.units_covered, 2);
        assert_eq!(stats.sections_covered, 1);
        assert!((stats.avg_word_count - 1.0).abs() < 1e-9);
    }
}
