//! Size guarantees for single logical elements.
//!
//! [`FallbackChunker`] turns one paragraph, list, table-as-text or notes block into zero or more
//! chunks that respect the configured bounds:
//!
//! - Invalid content (blank, or without any alphanumeric character) yields nothing.
//! - Content within `max_size` is emitted once, unchanged, if it meets the minimums.
//! - Longer content is split on sentence boundaries when it holds at least two sentence
//!   terminators, otherwise by the recursive separator ladder `\n\n`, `\n`, `. `, ` `, then
//!   single characters. Fragments below `min_chunk_size` are merged forward and the resulting
//!   pieces are emitted as `<type>_segment` chunks.
//!
//! Nothing here returns an error: degenerate input produces an empty or partial result.

use crate::config::ChunkingOptions;
use crate::model::{ChunkFactory, ChunkKind, char_count, word_count};

use super::table::render_table_text;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];
const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '。'];

/// Splits oversize elements and filters undersize ones.
#[derive(Debug, Clone)]
pub struct FallbackChunker {
    max_size: usize,
    min_chunk_size: usize,
    min_word_count: usize,
}

impl FallbackChunker {
    /// Build a chunker from the size bounds in `options`.
    pub fn new(options: &ChunkingOptions) -> Self {
        Self {
            max_size: options.max_size.max(1),
            min_chunk_size: options.min_chunk_size,
            min_word_count: options.min_word_count,
        }
    }

    /// Maximum chunk length in characters.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether `content` clears both minimum thresholds.
    pub fn meets_minimums(&self, content: &str) -> bool {
        char_count(content) >= self.min_chunk_size && word_count(content) >= self.min_word_count
    }

    /// Chunk one element, splitting and retyping it as `<type>_segment` when it is too long.
    pub fn chunk_element_with_fallback<C: ChunkFactory>(
        &self,
        content: &str,
        element_type: C::Kind,
        base_metadata: &C::Metadata,
    ) -> Vec<C> {
        if !is_valid_content(content) {
            return Vec::new();
        }

        if char_count(content) <= self.max_size {
            if self.meets_minimums(content) {
                return vec![C::assemble(
                    content.to_string(),
                    element_type,
                    base_metadata.clone(),
                )];
            }
            tracing::trace!(
                chunk_type = element_type.as_str(),
                chars = char_count(content),
                "Dropping element below minimum size"
            );
            return Vec::new();
        }

        let pieces = self.split_text(content);
        let total = pieces.len();
        let segment_type = element_type.segment();
        let chunks: Vec<C> = pieces
            .into_iter()
            .filter(|piece| is_valid_content(piece) && self.meets_minimums(piece))
            .map(|piece| C::assemble(piece, segment_type, base_metadata.clone()))
            .collect();

        tracing::debug!(
            chunk_type = element_type.as_str(),
            chars = char_count(content),
            segments = chunks.len(),
            dropped = total - chunks.len(),
            "Split oversize element"
        );
        chunks
    }

    /// Render a cell grid as text and chunk it.
    pub fn chunk_table_with_fallback<C: ChunkFactory>(
        &self,
        grid: &[Vec<String>],
        element_type: C::Kind,
        base_metadata: &C::Metadata,
    ) -> Vec<C> {
        let text = render_table_text(grid);
        self.chunk_element_with_fallback(&text, element_type, base_metadata)
    }

    /// Join list items line by line and chunk the result.
    pub fn chunk_list_with_fallback<C: ChunkFactory>(
        &self,
        items: &[String],
        element_type: C::Kind,
        base_metadata: &C::Metadata,
    ) -> Vec<C> {
        let text = items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self.chunk_element_with_fallback(&text, element_type, base_metadata)
    }

    /// Split `content` into pieces of at most `max_size` characters and merge short fragments.
    ///
    /// Merging may let a piece run past `max_size` when a short fragment is folded into it.
    pub fn split_text(&self, content: &str) -> Vec<String> {
        let pieces = if sentence_mark_count(content) >= 2 {
            self.split_sentences(content)
        } else {
            split_recursive(content, &SEPARATORS, self.max_size)
        };
        merge_short_fragments(pieces, self.min_chunk_size)
    }

    fn split_sentences(&self, content: &str) -> Vec<String> {
        let mut packed = Vec::new();
        let mut current = String::new();

        for sentence in sentences(content) {
            let sentence_len = char_count(&sentence);
            if sentence_len > self.max_size {
                flush(&mut current, &mut packed);
                packed.extend(split_recursive(&sentence, &SEPARATORS[1..], self.max_size));
                continue;
            }
            if !current.is_empty() && char_count(&current) + 1 + sentence_len > self.max_size {
                flush(&mut current, &mut packed);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
        }
        flush(&mut current, &mut packed);
        packed
    }
}

/// Whether `content` carries anything worth indexing.
///
/// Rejects blank text, a lone character and text without a single alphanumeric character.
pub fn is_valid_content(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut chars = trimmed.chars();
    if let (Some(only), None) = (chars.next(), chars.next())
        && !only.is_alphanumeric()
    {
        return false;
    }
    trimmed.chars().any(char::is_alphanumeric)
}

fn is_terminator_at(chars: &[char], index: usize) -> bool {
    SENTENCE_TERMINATORS.contains(&chars[index])
        && chars
            .get(index + 1)
            .is_none_or(|next| next.is_whitespace())
}

fn sentence_mark_count(content: &str) -> usize {
    let chars: Vec<char> = content.chars().collect();
    (0..chars.len())
        .filter(|&index| is_terminator_at(&chars, index))
        .count()
}

fn sentences(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let mut result = Vec::new();
    let mut start = 0;
    for index in 0..chars.len() {
        if is_terminator_at(&chars, index) {
            push_trimmed(&chars[start..=index], &mut result);
            start = index + 1;
        }
    }
    if start < chars.len() {
        push_trimmed(&chars[start..], &mut result);
    }
    result
}

fn push_trimmed(chars: &[char], out: &mut Vec<String>) {
    let text: String = chars.iter().collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Recursive character splitting: the first separator present in the text wins, pieces are
/// packed greedily and oversize pieces descend to the next separator.
fn split_recursive(text: &str, separators: &[&str], max_size: usize) -> Vec<String> {
    if char_count(text) <= max_size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let position = separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator));
    let Some(position) = position else {
        return split_by_chars(text, max_size);
    };
    let separator = separators[position];
    if separator.is_empty() {
        return split_by_chars(text, max_size);
    }
    let remaining = &separators[position + 1..];

    let mut out = Vec::new();
    let mut current = String::new();
    for piece in text.split_inclusive(separator) {
        let piece_len = char_count(piece);
        if piece_len > max_size {
            flush(&mut current, &mut out);
            out.extend(split_recursive(piece, remaining, max_size));
            continue;
        }
        if char_count(&current) + piece_len > max_size {
            flush(&mut current, &mut out);
        }
        current.push_str(piece);
    }
    flush(&mut current, &mut out);
    out
}

fn split_by_chars(text: &str, max_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_size)
        .map(|window| window.iter().collect::<String>())
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| piece.trim().to_string())
        .collect()
}

fn merge_short_fragments(pieces: Vec<String>, min_chunk_size: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(pieces.len());
    let mut pending = String::new();

    for piece in pieces {
        append_fragment(&mut pending, &piece);
        if char_count(&pending) >= min_chunk_size {
            merged.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        match merged.last_mut() {
            Some(last) => append_fragment(last, &pending),
            None => merged.push(pending),
        }
    }
    merged
}

fn append_fragment(target: &mut String, fragment: &str) {
    if target.is_empty() {
        target.push_str(fragment);
        return;
    }
    if !target.ends_with(char::is_whitespace) {
        target.push(' ');
    }
    target.push_str(fragment);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingOptions;
    use crate::model::{
        Chunk, ChunkMetadata, ChunkRecord, ChunkType, DocumentRef, PptxChunk, PptxChunkMetadata,
        PptxChunkType,
    };

    fn chunker(max_size: usize) -> FallbackChunker {
        FallbackChunker::new(&ChunkingOptions {
            max_size,
            ..ChunkingOptions::pdf_defaults()
        })
    }

    fn metadata() -> ChunkMetadata {
        ChunkMetadata::for_page(&DocumentRef::from_file_name("doc.pdf"), 1)
    }

    fn sentence(index: usize) -> String {
        format!("Sentence number {index} describes the quarterly revenue trend in detail.")
    }

    #[test]
    fn rejects_invalid_content() {
        assert!(!is_valid_content(""));
        assert!(!is_valid_content("   \n\t"));
        assert!(!is_valid_content("-"));
        assert!(!is_valid_content("--- *** ---"));
        assert!(is_valid_content("a"));
        assert!(is_valid_content("값"));
    }

    #[test]
    fn short_or_symbol_only_content_yields_nothing() {
        let chunker = chunker(500);
        for content in ["", "•", "Too short.", "!!!! ???? ---- //// ,,,, ;;;; :::: ++++ ~~~~ ====="] {
            let chunks: Vec<Chunk> =
                chunker.chunk_element_with_fallback(content, ChunkType::Paragraph, &metadata());
            assert!(chunks.is_empty(), "expected no chunks for {content:?}");
        }
    }

    #[test]
    fn content_within_max_size_is_kept_unchanged() {
        let chunker = chunker(500);
        let content = format!("  {}  ", sentence(1));
        let chunks: Vec<Chunk> =
            chunker.chunk_element_with_fallback(&content, ChunkType::Paragraph, &metadata());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content(), content);
        assert_eq!(chunks[0].chunk_type(), ChunkType::Paragraph);
    }

    #[test]
    fn long_prose_splits_into_segments_that_meet_minimums() {
        let chunker = chunker(200);
        let content = (0..12).map(sentence).collect::<Vec<_>>().join(" ");
        let chunks: Vec<Chunk> =
            chunker.chunk_element_with_fallback(&content, ChunkType::Paragraph, &metadata());

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert_eq!(chunk.chunk_type(), ChunkType::ParagraphSegment);
            assert!((chunk.metadata().chunk_type_weight - 0.9).abs() < 1e-6);
            assert!(chunk.char_count() >= 50);
            assert!(chunk.word_count() >= 5);
            assert!(chunk.char_count() <= 200);
            assert!(chunk.validate().is_ok());
        }

        let rebuilt: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.content().split_whitespace())
            .collect();
        let original: Vec<&str> = content.split_whitespace().collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn text_without_sentences_uses_separator_ladder() {
        let chunker = chunker(120);
        let lines: Vec<String> = (0..10)
            .map(|index| format!("line {index} with several plain words and no terminator"))
            .collect();
        let content = lines.join("\n");
        let pieces = chunker.split_text(&content);

        assert!(pieces.len() >= 4);
        for piece in &pieces {
            assert!(char_count(piece) <= 120);
            assert!(!piece.starts_with(' '));
        }
        assert_eq!(
            pieces.join(" ").split_whitespace().count(),
            content.split_whitespace().count()
        );
    }

    #[test]
    fn unbroken_text_falls_through_to_character_split() {
        let content = "x".repeat(250);
        let pieces = chunker(100).split_text(&content);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces.concat().len(), 250);
    }

    #[test]
    fn trailing_fragment_merges_into_previous_chunk() {
        let merged = merge_short_fragments(
            vec!["a".repeat(60), "b".repeat(20), "c".repeat(40), "d".repeat(10)],
            50,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], "a".repeat(60));
        assert_eq!(merged[1], format!("{} {} {}", "b".repeat(20), "c".repeat(40), "d".repeat(10)));
    }

    #[test]
    fn overlong_sentence_is_split_recursively() {
        let long_sentence = format!("{} end.", "word ".repeat(80).trim_end());
        let content = format!("{} {}", long_sentence, sentence(1));
        let pieces = chunker(150).split_text(&content);
        assert!(pieces.len() >= 3);
        assert!(pieces.iter().all(|piece| char_count(piece) <= 150));
    }

    #[test]
    fn table_and_list_variants_render_before_chunking() {
        let chunker = chunker(500);
        let grid = vec![
            vec!["분기".to_string(), "매출".to_string(), "비고".to_string()],
            vec!["1분기".to_string(), "100억".to_string(), "전년 대비 증가".to_string()],
            vec!["2분기".to_string(), "120억".to_string(), "신규 고객 확보로 성장".to_string()],
        ];
        let table: Vec<Chunk> =
            chunker.chunk_table_with_fallback(&grid, ChunkType::Table, &metadata());
        assert_eq!(table.len(), 1);
        assert!(table[0].content().starts_with("표 헤더: 분기 | 매출 | 비고\n행 1:"));

        let items = vec![
            "- first item describing the rollout plan".to_string(),
            "  ".to_string(),
            "- second item describing the budget".to_string(),
        ];
        let list: Vec<Chunk> = chunker.chunk_list_with_fallback(&items, ChunkType::List, &metadata());
        assert_eq!(list.len(), 1);
        assert_eq!(
            list[0].content(),
            "- first item describing the rollout plan\n- second item describing the budget"
        );
    }

    #[test]
    fn works_for_slide_chunks() {
        let chunker = FallbackChunker::new(&ChunkingOptions::pptx_defaults());
        let metadata = PptxChunkMetadata::for_slide(&DocumentRef::from_file_name("d.pptx"), 2);
        let notes = (0..10).map(sentence).collect::<Vec<_>>().join(" ");
        let chunks: Vec<PptxChunk> =
            chunker.chunk_element_with_fallback(&notes, PptxChunkType::SlideNotes, &metadata);
        assert!(chunks.len() >= 2);
        assert!(
            chunks
                .iter()
                .all(|chunk| chunk.chunk_type() == PptxChunkType::SlideNotesSegment)
        );
        assert!(chunks.iter().all(|chunk| chunk.metadata().slide_number == 2));
    }
}
