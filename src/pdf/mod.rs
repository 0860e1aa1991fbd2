//! PDF extraction, layout analysis and chunking.

pub mod engine;
pub mod layout;
pub mod source;

pub use engine::PdfChunker;
pub use layout::{ElementType, FontStatistics, LayoutAnalyzer, LayoutElement};
pub use source::{ExtractedTable, PageSource, PdfChar, PdfDocument, PdfError};
