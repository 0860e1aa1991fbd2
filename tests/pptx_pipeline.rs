use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustyrag::config::ChunkingOptions;
use rustyrag::ingest::{IngestError, IngestService};
use rustyrag::model::{PptxChunk, PptxChunkType, StoredChunk, verify_parent_links};
use rustyrag::pptx::PptxChunker;
use rustyrag::store::{ChunkStore, StoreError, VectorStore};
use zip::write::SimpleFileOptions;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const BULLETS: [&str; 3] = [
    "Revenue grew twelve percent against the previous quarter across regions",
    "Operating costs stayed inside the approved budget for every department",
    "Hiring slowed on purpose so that margins hold through the second half",
];

struct TempDeck(PathBuf);

impl Drop for TempDeck {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn run(text: &str) -> String {
    format!("<a:r><a:t>{text}</a:t></a:r>")
}

fn cell(text: &str) -> String {
    format!("<a:tc><a:txBody><a:p>{}</a:p></a:txBody></a:tc>", run(text))
}

fn slide_xml() -> String {
    let bullets: String = BULLETS
        .iter()
        .map(|bullet| format!("<a:p>{}</a:p>", run(bullet)))
        .collect();
    let rows: String = [["월", "매출", "비용"], ["1월", "120", "80"]]
        .iter()
        .map(|row| format!("<a:tr>{}</a:tr>", row.iter().map(|c| cell(c)).collect::<String>()))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld {NS}><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
<p:txBody><a:p>{title}</a:p></p:txBody></p:sp>
<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content 2"/><p:cNvSpPr/><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
<p:txBody>{bullets}</p:txBody></p:sp>
<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="4" name="Table 3"/></p:nvGraphicFramePr>
<p:xfrm><a:off x="0" y="0"/><a:ext cx="100" cy="100"/></p:xfrm>
<a:graphic><a:graphicData><a:tbl>{rows}</a:tbl></a:graphicData></a:graphic></p:graphicFrame>
</p:spTree></p:cSld></p:sld>"#,
        title = run("Q1 Report"),
    )
}

fn notes_xml(text: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<p:notes {NS}><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:cNvPr id="2" name="Notes 1"/><p:cNvSpPr/><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr>
<p:txBody><a:p>{}</a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:notes>"#,
        run(text)
    )
}

fn write_deck(notes: Option<&str>) -> TempDeck {
    let path = std::env::temp_dir().join(format!("rustyrag-{}.pptx", uuid::Uuid::new_v4()));
    let file = std::fs::File::create(&path).expect("create deck");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut slide_rels = String::new();
    if notes.is_some() {
        slide_rels = format!(
            r#"<Relationship Id="rId2" Type="{REL_BASE}/notesSlide" Target="../notesSlides/notesSlide1.xml"/>"#
        );
    }
    let mut parts = vec![
        (
            "[Content_Types].xml".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#.to_string(),
        ),
        (
            "ppt/presentation.xml".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><p:presentation {NS}><p:sldIdLst><p:sldId id="256" r:id="rId1"/></p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#
            ),
        ),
        (
            "ppt/_rels/presentation.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_BASE}/slide" Target="slides/slide1.xml"/></Relationships>"#
            ),
        ),
        ("ppt/slides/slide1.xml".to_string(), slide_xml()),
        (
            "ppt/slides/_rels/slide1.xml.rels".to_string(),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{REL_NS}">{slide_rels}</Relationships>"#
            ),
        ),
    ];
    if let Some(text) = notes {
        parts.push(("ppt/notesSlides/notesSlide1.xml".to_string(), notes_xml(text)));
    }

    for (name, body) in parts {
        zip.start_file(name, options).expect("start part");
        zip.write_all(body.as_bytes()).expect("write part");
    }
    zip.finish().expect("finish deck");
    TempDeck(path)
}

fn count(chunks: &[PptxChunk], kind: PptxChunkType) -> usize {
    chunks.iter().filter(|chunk| chunk.chunk_type() == kind).count()
}

async fn chunk(path: &Path) -> Vec<PptxChunk> {
    PptxChunker::new(ChunkingOptions::pptx_defaults())
        .chunk_pptx(path, false)
        .await
}

#[tokio::test]
async fn slide_decomposes_into_summary_title_bullets_and_table_views() {
    let deck = write_deck(None);
    let chunks = chunk(&deck.0).await;

    assert_eq!(count(&chunks, PptxChunkType::SlideSummary), 1);
    assert_eq!(count(&chunks, PptxChunkType::SlideTitle), 1);
    assert_eq!(count(&chunks, PptxChunkType::BulletGroup), 3);
    assert_eq!(count(&chunks, PptxChunkType::TableFull), 1);
    assert_eq!(count(&chunks, PptxChunkType::TableRow), 2);
    assert!(count(&chunks, PptxChunkType::TableColumn) <= 3);
    assert_eq!(count(&chunks, PptxChunkType::SlideNotes), 0);

    assert_eq!(chunks[0].chunk_type(), PptxChunkType::SlideSummary);
    let summary_id = chunks[0].id().to_string();
    for chunk in &chunks[1..] {
        assert_eq!(chunk.metadata().parent_chunk_id.as_deref(), Some(summary_id.as_str()));
        assert_eq!(chunk.metadata().slide_title.as_deref(), Some("Q1 Report"));
        assert_eq!(chunk.metadata().slide_number, 1);
    }
    verify_parent_links(&chunks).expect("parents resolve");

    let title = chunks
        .iter()
        .find(|chunk| chunk.chunk_type() == PptxChunkType::SlideTitle)
        .expect("title");
    assert_eq!(title.content(), "Q1 Report");

    let full = chunks
        .iter()
        .find(|chunk| chunk.chunk_type() == PptxChunkType::TableFull)
        .expect("table");
    let table = full.metadata().table.as_ref().expect("table metadata");
    assert_eq!(table.header_row, vec!["월", "매출", "비용"]);
    assert_eq!(table.data_type, "budget");
    assert_eq!(table.cell_reference.as_deref(), Some("A1:C2"));

    let bullets: Vec<&str> = chunks
        .iter()
        .filter(|chunk| chunk.chunk_type() == PptxChunkType::BulletGroup)
        .map(PptxChunk::content)
        .collect();
    assert_eq!(bullets, BULLETS);
}

#[tokio::test]
async fn speaker_notes_become_their_own_chunk() {
    let deck = write_deck(Some(
        "Mention the northern renewals first and then walk through the budget table slowly.",
    ));
    let chunks = chunk(&deck.0).await;

    assert_eq!(count(&chunks, PptxChunkType::SlideNotes), 1);
    assert!(chunks[0].metadata().has_notes);
    let notes = chunks
        .iter()
        .find(|chunk| chunk.chunk_type() == PptxChunkType::SlideNotes)
        .expect("notes");
    assert!(notes.content().contains("northern renewals"));
}

#[tokio::test]
async fn rechunking_is_idempotent_apart_from_ids() {
    let deck = write_deck(None);
    let first = chunk(&deck.0).await;
    let second = chunk(&deck.0).await;

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.chunk_type(), b.chunk_type());
        assert_eq!(a.content(), b.content());
        assert_ne!(a.id(), b.id());
    }
}

#[tokio::test]
async fn corrupt_archive_yields_no_chunks() {
    let path = std::env::temp_dir().join(format!("rustyrag-{}.pptx", uuid::Uuid::new_v4()));
    std::fs::write(&path, b"PK but not really a zip").expect("write");
    let chunks = chunk(&path).await;
    let _ = std::fs::remove_file(&path);
    assert!(chunks.is_empty());
}

/// In-memory store that rejects writes once frozen.
#[derive(Default)]
struct FreezableStore {
    chunks: ChunkStore,
    frozen: AtomicBool,
}

#[async_trait::async_trait]
impl VectorStore for FreezableStore {
    async fn add_documents(&self, chunks: Vec<StoredChunk>) -> Result<(), StoreError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidRecord("read-only".into()));
        }
        self.chunks.add_documents(chunks).await
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), StoreError> {
        self.chunks.delete_document(file_name).await
    }

    async fn delete_stale(&self, file_name: &str, keep: &[String]) -> Result<(), StoreError> {
        self.chunks.delete_stale(file_name, keep).await
    }
}

fn service(store: Arc<dyn VectorStore>) -> IngestService {
    IngestService::new(
        ChunkingOptions::pdf_defaults(),
        ChunkingOptions::pptx_defaults(),
        store,
    )
}

#[tokio::test]
async fn reingesting_a_deck_supersedes_its_chunks() {
    let deck = write_deck(None);
    let store = Arc::new(ChunkStore::new());
    let service = service(store.clone());

    let first = service.ingest(&deck.0, false).await.expect("first ingest");
    let second = service.ingest(&deck.0, false).await.expect("second ingest");
    assert_eq!(first.chunk_count, second.chunk_count);
    assert_eq!(second.large_chunks, 1);
    assert_eq!(store.len().await, second.chunk_count);

    let stored = store.document_chunks(&second.file_name).await;
    let summary = stored
        .iter()
        .find(|chunk| chunk.chunk_type == "slide_summary")
        .expect("summary stored");
    assert_eq!(store.children_of(&summary.id).await.len(), stored.len() - 1);

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.documents_chunked, 2);
    assert_eq!(snapshot.large_chunks, 2);
}

#[tokio::test]
async fn failed_reingest_keeps_the_previous_chunks() {
    let deck = write_deck(None);
    let store = Arc::new(FreezableStore::default());
    let service = service(store.clone());

    let first = service.ingest(&deck.0, false).await.expect("first ingest");
    let before: Vec<String> = store
        .chunks
        .document_chunks(&first.file_name)
        .await
        .into_iter()
        .map(|chunk| chunk.id)
        .collect();
    assert_eq!(before.len(), first.chunk_count);

    store.frozen.store(true, Ordering::SeqCst);
    let error = service.ingest(&deck.0, false).await.expect_err("rejected");
    assert!(matches!(error, IngestError::Store(_)));
    assert_eq!(service.metrics_snapshot().failed_documents, 1);

    let after: Vec<String> = store
        .chunks
        .document_chunks(&first.file_name)
        .await
        .into_iter()
        .map(|chunk| chunk.id)
        .collect();
    assert_eq!(after, before);
}
