//! Fallback splitting and read-only chunk summaries shared by the PDF and PPTX engines.

mod fallback;
mod statistics;
mod table;

pub use fallback::{FallbackChunker, is_valid_content};
pub use statistics::{ChunkStatistics, get_chunk_statistics};
pub use table::{render_markdown_table, render_table_text};

pub(crate) use table::clean_cell;
