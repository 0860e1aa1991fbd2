//! PPTX package reading and Small-to-Large slide chunking.

pub mod bullets;
pub mod engine;
pub mod package;
pub mod table;

pub use bullets::{BulletGroup, group_bullets};
pub use engine::{PptxChunker, SlideContent};
pub use package::{
    Paragraph, PptxError, PptxPackage, Shape, ShapeError, ShapeGeometry, ShapeKind, SlideData,
};
pub use table::{decompose_table, detect_table_data_type};
