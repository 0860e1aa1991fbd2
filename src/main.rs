use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rustyrag::config::{self, Config};
use rustyrag::embedding::HashingEmbedder;
use rustyrag::ingest::{DocumentChunks, DocumentKind, IngestService};
use rustyrag::logging;
use rustyrag::model::ChunkRecord;
use rustyrag::store::{ChunkStore, QdrantStore, VectorStore};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "rustyrag",
    version,
    about = "Small-to-Large chunking for PDF and PPTX documents"
)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace, -vvv trace including dependencies).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk one document and print the chunks.
    Chunk {
        path: PathBuf,
        /// Prepend a vision analysis to slide summaries.
        #[arg(long)]
        vision: bool,
        /// Print full chunk records as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Chunk one document and print aggregate statistics.
    Stats {
        path: PathBuf,
        #[arg(long)]
        vision: bool,
    },
    /// Chunk a document, or every PDF/PPTX under a directory, into Qdrant.
    Index {
        path: PathBuf,
        #[arg(long)]
        vision: bool,
    },
    /// Remove a document's chunks from Qdrant.
    Delete { file_name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    if let Err(err) = config::init_config() {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::get_config();
    match cli.command {
        Command::Chunk { path, vision, json } => {
            let service = IngestService::from_config(config, Arc::new(ChunkStore::new()));
            let chunks = chunk(&service, &path, vision).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                print_chunks(&chunks);
            }
        }
        Command::Stats { path, vision } => {
            let service = IngestService::from_config(config, Arc::new(ChunkStore::new()));
            let chunks = chunk(&service, &path, vision).await?;
            println!("{}", serde_json::to_string_pretty(&chunks.statistics())?);
        }
        Command::Index { path, vision } => {
            let store = qdrant_store(config).await?;
            let service = IngestService::from_config(config, store);
            let documents = collect_documents(&path)?;
            if documents.is_empty() {
                bail!("no .pdf or .pptx documents found under {}", path.display());
            }
            for document in &documents {
                let outcome = service
                    .ingest(document, vision)
                    .await
                    .with_context(|| format!("failed to index {}", document.display()))?;
                println!(
                    "{}\t{:?}\t{} chunks ({} large)",
                    outcome.file_name, outcome.kind, outcome.chunk_count, outcome.large_chunks
                );
            }
            let snapshot = service.metrics_snapshot();
            tracing::info!(
                documents = snapshot.documents_chunked,
                chunks = snapshot.chunks_emitted,
                large = snapshot.large_chunks,
                empty = snapshot.empty_documents,
                "Indexing finished"
            );
        }
        Command::Delete { file_name } => {
            let store = qdrant_store(config).await?;
            store
                .delete_document(&file_name)
                .await
                .with_context(|| format!("failed to delete {file_name}"))?;
            println!("deleted {file_name}");
        }
    }
    Ok(())
}

async fn chunk(service: &IngestService, path: &Path, vision: bool) -> Result<DocumentChunks> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    let chunks = service
        .chunk_document(path, vision)
        .await
        .with_context(|| format!("failed to chunk {}", path.display()))?;
    if chunks.is_empty() {
        tracing::warn!(path = %path.display(), "Document produced no chunks");
    }
    Ok(chunks)
}

async fn qdrant_store(config: &Config) -> Result<Arc<QdrantStore>> {
    let url = config
        .qdrant_url
        .as_deref()
        .context("QDRANT_URL must be set to index or delete documents")?;
    let store = QdrantStore::new(
        url,
        config.qdrant_api_key.clone(),
        config.qdrant_collection_name.clone(),
        Arc::new(HashingEmbedder::new(config.embedding_dimension)),
    )?;
    store
        .ensure_collection()
        .await
        .with_context(|| format!("failed to prepare collection {}", store.collection()))?;
    Ok(Arc::new(store))
}

fn collect_documents(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }
    let mut documents: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file() && DocumentKind::from_path(entry.path()).is_some()
        })
        .map(|entry| entry.into_path())
        .collect();
    documents.sort();
    Ok(documents)
}

fn print_chunks(chunks: &DocumentChunks) {
    fn line<C: ChunkRecord>(chunk: &C) {
        let preview: String = chunk.content().chars().take(80).collect();
        println!(
            "[{:>3}] {:<22} {:>4} chars  {}",
            chunk.unit_number(),
            chunk.type_name(),
            chunk.char_count(),
            preview.replace('\n', " ")
        );
    }
    match chunks {
        DocumentChunks::Pdf(chunks) => chunks.iter().for_each(line),
        DocumentChunks::Pptx(chunks) => chunks.iter().for_each(line),
    }
}
