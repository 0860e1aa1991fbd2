//! Page-by-page Small-to-Large chunking for PDF documents.

use std::cell::OnceCell;
use std::path::Path;

use super::layout::{ElementType, LayoutAnalyzer, LayoutElement};
use super::source::{PageSource, PdfDocument, extract_plain_pages};
use crate::chunking::{FallbackChunker, is_valid_content};
use crate::config::ChunkingOptions;
use crate::model::{BoundingBox, Chunk, ChunkMetadata, ChunkType, DocumentRef, char_count};

/// Turns PDF documents into page summaries and layout-driven Small chunks.
#[derive(Debug, Clone)]
pub struct PdfChunker {
    options: ChunkingOptions,
    fallback: FallbackChunker,
    analyzer: LayoutAnalyzer,
}

impl PdfChunker {
    /// Build a chunker with fixed options.
    pub fn new(options: ChunkingOptions) -> Self {
        let fallback = FallbackChunker::new(&options);
        Self {
            options,
            fallback,
            analyzer: LayoutAnalyzer::new(),
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Chunk a PDF file.
    ///
    /// Never fails: a file `lopdf` cannot open is retried as plain text through `pdf-extract`,
    /// and an empty list is returned when that fails too. A page whose content stream yields no
    /// text takes its `pdf-extract` text instead.
    pub fn chunk_pdf(&self, path: &Path) -> Vec<Chunk> {
        let document = DocumentRef::from_path(path);
        match PdfDocument::open(path) {
            Ok(pdf) => {
                tracing::info!(
                    file = %document.source_file,
                    pages = pdf.page_count(),
                    "Chunking PDF"
                );
                let recovered: OnceCell<Vec<String>> = OnceCell::new();
                let recover = |page_number: usize| {
                    let pages = recovered.get_or_init(|| {
                        extract_plain_pages(path).unwrap_or_else(|error| {
                            tracing::debug!(error = %error, "pdf-extract page text unavailable");
                            Vec::new()
                        })
                    });
                    page_number
                        .checked_sub(1)
                        .and_then(|index| pages.get(index))
                        .cloned()
                };
                self.chunk_pages_recovering(&document, pdf.pages(), recover)
            }
            Err(error) => {
                tracing::warn!(
                    file = %document.source_file,
                    error = %error,
                    "PDF parser failed; falling back to plain-text extraction"
                );
                match extract_plain_pages(path) {
                    Ok(pages) => self.chunk_plain_pages(&document, &pages),
                    Err(error) => {
                        tracing::error!(
                            file = %document.source_file,
                            error = %error,
                            "Plain-text extraction failed; no chunks produced"
                        );
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Chunk a sequence of pages, threading the section title from page to page.
    pub fn chunk_pages<P: PageSource>(
        &self,
        document: &DocumentRef,
        pages: impl IntoIterator<Item = P>,
    ) -> Vec<Chunk> {
        self.chunk_pages_recovering(document, pages, |_| None)
    }

    /// Like [`chunk_pages`](Self::chunk_pages), asking `recover` for a page's text when
    /// the content stream yields nothing.
    fn chunk_pages_recovering<P: PageSource>(
        &self,
        document: &DocumentRef,
        pages: impl IntoIterator<Item = P>,
        recover: impl Fn(usize) -> Option<String>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut section_title: Option<String> = None;
        for page in pages {
            let mut elements = if self.options.enable_layout_analysis {
                self.analyzer.analyze_page(&page)
            } else {
                page.plain_text()
                    .map(|text| plain_paragraphs(&text))
                    .unwrap_or_default()
            };
            let mut page_text = page.plain_text().unwrap_or_else(|error| {
                tracing::debug!(
                    page = page.page_number(),
                    error = %error,
                    "Page text unavailable"
                );
                String::new()
            });
            if page_text.trim().is_empty() {
                page_text = elements
                    .iter()
                    .map(|element| element.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if elements.is_empty()
                && page_text.trim().is_empty()
                && let Some(text) =
                    recover(page.page_number()).filter(|text| !text.trim().is_empty())
            {
                tracing::debug!(
                    page = page.page_number(),
                    "No text in content stream; using pdf-extract page text"
                );
                elements = plain_paragraphs(&text);
                page_text = text;
            }
            chunks.extend(self.chunk_page(
                document,
                page.page_number(),
                &page_text,
                elements,
                &mut section_title,
            ));
        }
        tracing::debug!(
            file = %document.source_file,
            chunks = chunks.len(),
            "PDF chunking finished"
        );
        chunks
    }

    fn chunk_plain_pages(&self, document: &DocumentRef, pages: &[String]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut section_title = None;
        for (index, text) in pages.iter().enumerate() {
            if text.trim().is_empty() && index + 1 == pages.len() {
                continue;
            }
            chunks.extend(self.chunk_page(
                document,
                index + 1,
                text,
                plain_paragraphs(text),
                &mut section_title,
            ));
        }
        chunks
    }

    fn chunk_page(
        &self,
        document: &DocumentRef,
        page_number: usize,
        page_text: &str,
        elements: Vec<LayoutElement>,
        section_title: &mut Option<String>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut base = ChunkMetadata::for_page(document, page_number);
        base.section_title = section_title.clone();

        if self.options.enable_small_to_large {
            let summary = Chunk::page_summary(page_text.trim().to_string(), base.clone());
            base.parent_chunk_id = Some(summary.id().to_string());
            chunks.push(summary);
        }

        let mut pending_list: Vec<LayoutElement> = Vec::new();
        for element in elements {
            if element.element_type == ElementType::ListItem {
                pending_list.push(element);
                continue;
            }
            self.flush_list(&mut pending_list, &base, &mut chunks);

            match element.element_type {
                ElementType::Heading => {
                    let heading = element.text.trim().to_string();
                    if is_valid_content(&heading) {
                        *section_title = Some(heading);
                        base.section_title = section_title.clone();
                    }
                    self.push_title(&element, &base, &mut chunks);
                }
                ElementType::Section => self.push_title(&element, &base, &mut chunks),
                ElementType::Caption | ElementType::Paragraph => {
                    let metadata = element_metadata(&base, &element);
                    chunks.extend(self.fallback.chunk_element_with_fallback::<Chunk>(
                        &element.text,
                        ChunkType::Paragraph,
                        &metadata,
                    ));
                }
                ElementType::Table => self.push_table(&element, &base, &mut chunks),
                ElementType::ListItem => {}
            }
        }
        self.flush_list(&mut pending_list, &base, &mut chunks);
        chunks
    }

    fn push_title(&self, element: &LayoutElement, base: &ChunkMetadata, chunks: &mut Vec<Chunk>) {
        let text = element.text.trim();
        if !is_valid_content(text) {
            return;
        }
        let metadata = element_metadata(base, element);
        if char_count(text) <= self.fallback.max_size() {
            chunks.push(Chunk::title(text.to_string(), metadata));
        } else {
            chunks.extend(self.fallback.chunk_element_with_fallback::<Chunk>(
                text,
                ChunkType::Title,
                &metadata,
            ));
        }
    }

    fn push_table(&self, element: &LayoutElement, base: &ChunkMetadata, chunks: &mut Vec<Chunk>) {
        if !is_valid_content(&element.text) {
            return;
        }
        let metadata = element_metadata(base, element);
        if char_count(&element.text) <= self.fallback.max_size() {
            chunks.push(Chunk::table(element.text.clone(), metadata));
            return;
        }
        match &element.grid {
            Some(grid) => chunks.extend(self.fallback.chunk_table_with_fallback::<Chunk>(
                grid,
                ChunkType::Table,
                &metadata,
            )),
            None => chunks.extend(self.fallback.chunk_element_with_fallback::<Chunk>(
                &element.text,
                ChunkType::Table,
                &metadata,
            )),
        }
    }

    fn flush_list(
        &self,
        pending: &mut Vec<LayoutElement>,
        base: &ChunkMetadata,
        chunks: &mut Vec<Chunk>,
    ) {
        if pending.is_empty() {
            return;
        }
        let items: Vec<String> = pending.iter().map(|item| item.text.clone()).collect();
        let mut metadata = base.clone();
        metadata.font_size = pending.iter().find_map(|item| item.font_size);
        metadata.is_bold = pending.iter().all(|item| item.is_bold);
        metadata.coordinates = pending
            .iter()
            .filter_map(|item| item.bbox)
            .reduce(BoundingBox::union);
        chunks.extend(
            self.fallback
                .chunk_list_with_fallback::<Chunk>(&items, ChunkType::List, &metadata),
        );
        pending.clear();
    }
}

fn element_metadata(base: &ChunkMetadata, element: &LayoutElement) -> ChunkMetadata {
    let mut metadata = base.clone();
    metadata.font_size = element.font_size;
    metadata.is_bold = element.is_bold;
    metadata.heading_level = element.heading_level;
    metadata.coordinates = element.bbox;
    metadata
}

/// Blank-line separated paragraphs of plain page text.
fn plain_paragraphs(text: &str) -> Vec<LayoutElement> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(LayoutElement::plain_paragraph)
        .collect()
}
