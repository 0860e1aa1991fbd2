#![deny(missing_docs)]

//! Core library for Rusty RAG, a Small-to-Large chunker for PDF and PPTX documents.

/// Fallback splitting and chunk statistics shared by both engines.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document routing and vector-store handoff.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Chunk records, metadata, and factories.
pub mod model;
/// PDF extraction, layout analysis, and chunking.
pub mod pdf;
/// PPTX package reading and chunking.
pub mod pptx;
/// Vector store interface and implementations.
pub mod store;
/// Slide rendering and vision LLM clients.
pub mod vision;
