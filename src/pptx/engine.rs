//! Slide-by-slide Small-to-Large chunking for presentations.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;

use super::bullets::group_bullets;
use super::package::{PptxError, PptxPackage, ShapeKind, SlideData};
use super::table::decompose_table;
use crate::chunking::FallbackChunker;
use crate::config::ChunkingOptions;
use crate::model::{DocumentRef, PptxChunk, PptxChunkMetadata, PptxChunkType};
use crate::vision::{SlideRenderer, VisionClient, build_slide_prompt};

/// One parsed slide and the outcome of reading its speaker notes.
#[derive(Debug)]
pub struct SlideContent {
    /// Parsed slide.
    pub slide: SlideData,
    /// Notes text; an error abandons the slide's Small chunks.
    pub notes: Result<Option<String>, PptxError>,
}

#[derive(Clone)]
struct VisionBackend {
    client: Arc<dyn VisionClient>,
    renderer: Arc<dyn SlideRenderer>,
}

/// Turns presentations into slide summaries and structural Small chunks.
#[derive(Clone)]
pub struct PptxChunker {
    options: ChunkingOptions,
    fallback: FallbackChunker,
    vision: Option<VisionBackend>,
}

impl PptxChunker {
    /// Build a text-only chunker with fixed options.
    pub fn new(options: ChunkingOptions) -> Self {
        let fallback = FallbackChunker::new(&options);
        Self {
            options,
            fallback,
            vision: None,
        }
    }

    /// Enable vision-augmented summaries through `client`, rendering slides with `renderer`.
    pub fn with_vision(
        mut self,
        client: Arc<dyn VisionClient>,
        renderer: Arc<dyn SlideRenderer>,
    ) -> Self {
        self.vision = Some(VisionBackend { client, renderer });
        self
    }

    /// Options in effect.
    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    /// Chunk a presentation file.
    ///
    /// Never fails: an unreadable package yields an empty list, and vision failures fall back
    /// to text-only summaries for the affected slides.
    pub async fn chunk_pptx(&self, path: &Path, use_vision: bool) -> Vec<PptxChunk> {
        let document = DocumentRef::from_path(path);
        let deck = path.to_path_buf();
        let slides = match tokio::task::spawn_blocking(move || read_deck(&deck)).await {
            Ok(Ok(slides)) => slides,
            Ok(Err(error)) => {
                tracing::error!(
                    file = %document.source_file,
                    error = %error,
                    "Failed to open presentation; no chunks produced"
                );
                return Vec::new();
            }
            Err(error) => {
                tracing::error!(
                    file = %document.source_file,
                    error = %error,
                    "Presentation reader task failed"
                );
                return Vec::new();
            }
        };
        tracing::info!(
            file = %document.source_file,
            slides = slides.len(),
            vision = use_vision,
            "Chunking presentation"
        );

        let analyses = if use_vision && self.options.enable_small_to_large {
            self.analyze_slides(path, &slides).await
        } else {
            vec![None; slides.len()]
        };
        self.chunk_slides(&document, &slides, &analyses)
    }

    /// Chunk parsed slides; `analyses[i]` is prepended to the summary of `slides[i]`.
    pub fn chunk_slides(
        &self,
        document: &DocumentRef,
        slides: &[SlideContent],
        analyses: &[Option<String>],
    ) -> Vec<PptxChunk> {
        let mut chunks = Vec::new();
        for (position, content) in slides.iter().enumerate() {
            let analysis = analyses.get(position).and_then(Option::as_deref);
            chunks.extend(self.chunk_slide(document, content, analysis));
        }
        tracing::debug!(
            file = %document.source_file,
            chunks = chunks.len(),
            "Presentation chunking finished"
        );
        chunks
    }

    fn chunk_slide(
        &self,
        document: &DocumentRef,
        content: &SlideContent,
        analysis: Option<&str>,
    ) -> Vec<PptxChunk> {
        let slide = &content.slide;
        let mut chunks = Vec::new();
        let title = slide.title();

        let mut base = PptxChunkMetadata::for_slide(document, slide.number);
        base.slide_title = title.clone();
        base.has_notes = matches!(content.notes, Ok(Some(_)));

        if self.options.enable_small_to_large {
            let text = slide.summary_text();
            let summary_text = match analysis {
                Some(analysis) if text.is_empty() => analysis.to_string(),
                Some(analysis) => format!("{analysis}\n\n{text}"),
                None => text,
            };
            let summary = PptxChunk::new(summary_text, PptxChunkType::SlideSummary, base.clone());
            base.parent_chunk_id = Some(summary.id().to_string());
            chunks.push(summary);
        }

        let notes = match &content.notes {
            Ok(notes) => notes.as_deref(),
            Err(error) => {
                tracing::warn!(
                    slide = slide.number,
                    error = %error,
                    "Slide notes unreadable; skipping Small chunks for this slide"
                );
                return chunks;
            }
        };

        if let Some(title) = &title {
            chunks.push(PptxChunk::new(
                title.clone(),
                PptxChunkType::SlideTitle,
                with_shape_type(&base, "title"),
            ));
        }

        if let Some(notes) = notes {
            chunks.extend(self.fallback.chunk_element_with_fallback::<PptxChunk>(
                notes,
                PptxChunkType::SlideNotes,
                &with_shape_type(&base, "notes"),
            ));
        }

        let mut table_count = 0;
        for shape in &slide.shapes {
            let shape = match shape {
                Ok(shape) => shape,
                Err(error) => {
                    tracing::warn!(slide = slide.number, error = %error, "Skipping malformed shape");
                    continue;
                }
            };
            if shape.is_title_placeholder() {
                continue;
            }
            match &shape.kind {
                ShapeKind::TextFrame { paragraphs } => {
                    for group in group_bullets(paragraphs) {
                        let mut metadata = with_shape_type(&base, shape.kind.label());
                        metadata.bullet_level = Some(group.min_level());
                        chunks.extend(self.fallback.chunk_element_with_fallback::<PptxChunk>(
                            &group.text(),
                            PptxChunkType::BulletGroup,
                            &metadata,
                        ));
                    }
                }
                ShapeKind::Table { rows } => {
                    table_count += 1;
                    let table_id = format!("slide{}_table{table_count}", slide.number);
                    chunks.extend(decompose_table(rows, &table_id, &base));
                }
                ShapeKind::Picture { .. } | ShapeKind::Other => {}
            }
        }
        chunks
    }

    async fn analyze_slides(&self, path: &Path, slides: &[SlideContent]) -> Vec<Option<String>> {
        let Some(vision) = self.vision.clone() else {
            tracing::warn!("Vision requested but no vision backend is configured");
            return vec![None; slides.len()];
        };

        let indices: Vec<usize> = slides.iter().map(|content| content.slide.number - 1).collect();
        let renderer = Arc::clone(&vision.renderer);
        let deck = path.to_path_buf();
        let images = match tokio::task::spawn_blocking(move || {
            render_all(renderer.as_ref(), &deck, &indices)
        })
        .await
        {
            Ok(images) => images,
            Err(error) => {
                tracing::warn!(error = %error, "Slide render task failed");
                vec![None; slides.len()]
            }
        };

        let titles: Vec<Option<String>> = slides.iter().map(|content| content.slide.title()).collect();
        let mut analyses = Vec::with_capacity(slides.len());
        for (position, image) in images.into_iter().enumerate() {
            let Some(png) = image else {
                analyses.push(None);
                continue;
            };
            let number = slides[position].slide.number;
            let previous = position
                .checked_sub(1)
                .and_then(|index| titles[index].as_deref());
            let next = titles.get(position + 1).and_then(Option::as_deref);
            let prompt = build_slide_prompt(number, slides.len(), previous, next);
            let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
            match vision.client.analyze_image(&encoded, &prompt).await {
                Ok(analysis) => {
                    tracing::debug!(
                        slide = number,
                        provider = vision.client.provider(),
                        chars = analysis.chars().count(),
                        "Vision analysis received"
                    );
                    analyses.push(Some(analysis));
                }
                Err(error) => {
                    tracing::warn!(
                        slide = number,
                        error = %error,
                        "Vision analysis failed; using text-only summary"
                    );
                    analyses.push(None);
                }
            }
        }
        analyses
    }
}

fn with_shape_type(base: &PptxChunkMetadata, shape_type: &str) -> PptxChunkMetadata {
    let mut metadata = base.clone();
    metadata.shape_type = Some(shape_type.to_string());
    metadata
}

/// Parse every slide and its notes. Slides that fail to parse are logged and left out.
fn read_deck(path: &Path) -> Result<Vec<SlideContent>, PptxError> {
    let mut package = PptxPackage::open(path)?;
    let mut slides = Vec::with_capacity(package.slide_count());
    for index in 0..package.slide_count() {
        let slide = match package.read_slide(index) {
            Ok(slide) => slide,
            Err(error) => {
                tracing::warn!(slide = index + 1, error = %error, "Skipping unreadable slide");
                continue;
            }
        };
        let notes = package.read_notes(&slide);
        slides.push(SlideContent { slide, notes });
    }
    Ok(slides)
}

/// Render the requested slides in one session; the session is released before returning.
fn render_all(
    renderer: &dyn SlideRenderer,
    deck: &Path,
    indices: &[usize],
) -> Vec<Option<Vec<u8>>> {
    let mut session = match renderer.open(deck) {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(
                renderer = renderer.name(),
                error = %error,
                "Could not start render session; using text-only summaries"
            );
            return vec![None; indices.len()];
        }
    };
    indices
        .iter()
        .map(|&index| match session.render_slide(index) {
            Ok(png) => Some(png),
            Err(error) => {
                tracing::warn!(
                    renderer = renderer.name(),
                    slide = index + 1,
                    error = %error,
                    "Slide render failed"
                );
                None
            }
        })
        .collect()
}
