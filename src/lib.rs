#![deny(missing_docs)]

//! Core library for the PDF retrieval-augmented question answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat completion client abstraction and the OpenAI adapter.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and the OpenAI adapter.
pub mod embedding;
/// Flat vector index with on-disk persistence.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// PDF loading and text chunking.
pub mod processing;
/// Retrieval, ranking, prompting, and the orchestrating service.
pub mod rag;
