use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use rustyrag::chunking::get_chunk_statistics;
use rustyrag::config::ChunkingOptions;
use rustyrag::model::{Chunk, ChunkType, verify_parent_links};
use rustyrag::pdf::PdfChunker;

const PARAGRAPH_LINES: [&str; 8] = [
    "The quarterly review covers revenue, operating costs and hiring across all",
    "regions. Revenue grew by twelve percent compared with the previous quarter",
    "while operating costs remained within the approved budget envelope. The",
    "northern region delivered the strongest growth thanks to two large renewals",
    "and a steady pipeline of mid sized accounts. Hiring slowed deliberately to",
    "protect margins, and the finance team expects the same discipline to hold",
    "through the second half. Risks include currency movements and supplier",
    "pricing, both of which are tracked weekly by the operations committee now.",
];

struct TempPdf(PathBuf);

impl Drop for TempPdf {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn text_ops(
    font: &str,
    size: i64,
    x: i64,
    y: i64,
    lines: &[&str],
    leading: i64,
) -> Vec<Operation> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
    ];
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            operations.push(Operation::new("Td", vec![0.into(), (-leading).into()]));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
    }
    operations.push(Operation::new("ET", vec![]));
    operations
}

fn write_report_pdf() -> TempPdf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
    });

    let mut first = text_ops("F2", 24, 72, 720, &["Introduction"], 0);
    first.extend(text_ops("F1", 11, 72, 680, &PARAGRAPH_LINES, 14));
    let second = text_ops(
        "F1",
        11,
        72,
        720,
        &["The appendix lists the detailed figures for every region in the review."],
        14,
    );

    let mut kids: Vec<Object> = Vec::new();
    for operations in [first, second] {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = std::env::temp_dir().join(format!("rustyrag-{}.pdf", uuid::Uuid::new_v4()));
    doc.save(&path).expect("save pdf");
    TempPdf(path)
}

const FORM_PARAGRAPH: &str =
    "Totals inside a reusable form object are part of the page text and must be indexed.";

/// One page whose only content is `q /X1 Do Q`, with the text inside Form XObject `X1`.
fn write_form_pdf() -> TempPdf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let form_content = Content {
        operations: text_ops("F1", 11, 72, 600, &[FORM_PARAGRAPH], 14),
    };
    let form = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 100.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
        },
        form_content.encode().expect("encode form"),
    ));
    let page_content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("Do", vec!["X1".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        page_content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => dictionary! { "X1" => form } },
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = std::env::temp_dir().join(format!("rustyrag-{}.pdf", uuid::Uuid::new_v4()));
    doc.save(&path).expect("save pdf");
    TempPdf(path)
}

fn squash(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn count(chunks: &[Chunk], kind: ChunkType) -> usize {
    chunks.iter().filter(|chunk| chunk.chunk_type() == kind).count()
}

fn chunk(path: &Path) -> Vec<Chunk> {
    PdfChunker::new(ChunkingOptions::pdf_defaults()).chunk_pdf(path)
}

#[test]
fn heading_and_long_paragraph_become_title_and_segments() {
    let pdf = write_report_pdf();
    let chunks = chunk(&pdf.0);

    assert_eq!(count(&chunks, ChunkType::PageSummary), 2);
    assert_eq!(count(&chunks, ChunkType::Title), 1);
    let title = chunks
        .iter()
        .find(|chunk| chunk.chunk_type() == ChunkType::Title)
        .expect("title chunk");
    assert!(title.content().contains("Introduction"));

    let segments: Vec<&Chunk> = chunks
        .iter()
        .filter(|chunk| chunk.chunk_type() == ChunkType::ParagraphSegment)
        .collect();
    assert!(segments.len() >= 2, "got {} segments", segments.len());
    for segment in &segments {
        assert_eq!(
            segment.metadata().section_title.as_deref(),
            Some("Introduction")
        );
        assert_eq!(segment.metadata().page_number, 1);
        assert!(segment.metadata().chunk_type_weight < 1.0);
    }
    let covered: String = segments.iter().map(|segment| squash(segment.content())).collect();
    assert_eq!(covered, squash(&PARAGRAPH_LINES.join(" ")));

    verify_parent_links(&chunks).expect("parents resolve");
    for chunk in &chunks {
        chunk.validate().expect("profile and weight consistent");
    }
}

#[test]
fn section_title_carries_into_the_next_page() {
    let pdf = write_report_pdf();
    let chunks = chunk(&pdf.0);
    let page_two: Vec<&Chunk> = chunks
        .iter()
        .filter(|chunk| chunk.metadata().page_number == 2)
        .collect();
    assert!(!page_two.is_empty());
    assert!(
        page_two
            .iter()
            .filter(|chunk| chunk.chunk_type() != ChunkType::PageSummary)
            .all(|chunk| chunk.metadata().section_title.as_deref() == Some("Introduction"))
    );

    let stats = get_chunk_statistics(&chunks);
    assert_eq!(stats.large_chunks, 2);
    assert_eq!(stats.units_covered, 2);
}

#[test]
fn rechunking_is_idempotent_apart_from_ids() {
    let pdf = write_report_pdf();
    let first = chunk(&pdf.0);
    let second = chunk(&pdf.0);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.chunk_type(), b.chunk_type());
        assert_eq!(a.content(), b.content());
        assert_ne!(a.id(), b.id());
    }
}

#[test]
fn unreadable_file_yields_no_chunks() {
    let path = std::env::temp_dir().join(format!("rustyrag-{}.pdf", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"not a pdf at all").expect("write");
    let chunks = chunk(&path);
    let _ = std::fs::remove_file(&path);
    assert!(chunks.is_empty());
}

#[test]
fn text_inside_form_xobjects_is_chunked() {
    let pdf = write_form_pdf();
    let chunks = chunk(&pdf.0);

    assert_eq!(count(&chunks, ChunkType::PageSummary), 1);
    assert_eq!(squash(chunks[0].content()), squash(FORM_PARAGRAPH));

    let paragraph = chunks
        .iter()
        .find(|chunk| chunk.chunk_type() == ChunkType::Paragraph)
        .expect("paragraph chunk");
    assert_eq!(squash(paragraph.content()), squash(FORM_PARAGRAPH));
    assert_eq!(
        paragraph.metadata().parent_chunk_id.as_deref(),
        Some(chunks[0].id())
    );

    // Baseline at 600 + 100 from the form matrix, measured down from a 792pt page.
    let bbox = paragraph.metadata().coordinates.expect("coordinates");
    assert!((bbox.bottom - 92.0).abs() < 0.5, "bottom {}", bbox.bottom);
    assert!((bbox.x0 - 72.0).abs() < 0.5, "x0 {}", bbox.x0);
}
