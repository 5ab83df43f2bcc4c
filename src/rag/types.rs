//! Request outcomes and errors of the RAG pipeline.

use crate::{
    completion::CompletionError, embedding::EmbeddingClientError, index::IndexError,
    index::IndexStats, metrics::MetricsSnapshot, processing::DocumentError,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Answer returned when no chunk clears the similarity threshold.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant information in the documents to answer your question.";

/// Errors emitted by the RAG orchestrator.
#[derive(Debug, Error)]
pub enum RagError {
    /// Caller input failed validation.
    #[error("{0}")]
    InvalidRequest(String),
    /// Document loading or chunking failed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Completion provider failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// Index mutation, search, or persistence failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A directory ingestion found nothing to ingest.
    #[error("No PDF documents found under {}", .0.display())]
    NoDocuments(PathBuf),
    /// Blocking document work panicked or was cancelled.
    #[error("Document processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Summary of an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Always `"success"`; failures are reported as errors.
    pub status: String,
    /// Chunks cut from the document.
    pub chunks_created: usize,
    /// Vectors produced by the embedding provider.
    pub embeddings_generated: usize,
    /// Chunks dropped because an identical chunk appeared earlier in the document.
    pub skipped_duplicates: usize,
    /// Vectors in the index after ingestion.
    pub total_vectors: usize,
    /// File name of the document.
    pub source: String,
}

/// Provenance of one context chunk used for an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// File name of the document.
    pub source: String,
    /// Chunk position within the document.
    pub chunk_id: usize,
    /// Similarity of the chunk to the query.
    pub similarity_score: f32,
}

/// Grounded answer with the context it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Model answer, or [`NO_CONTEXT_ANSWER`].
    pub answer: String,
    /// Chunk texts placed in the prompt, best first.
    pub context: Vec<String>,
    /// Provenance of each context chunk.
    pub sources: Vec<SourceInfo>,
    /// Query as asked, before entity rewriting.
    pub query: String,
}

impl QueryOutcome {
    pub(crate) fn without_context(query: &str) -> Self {
        Self {
            answer: NO_CONTEXT_ANSWER.to_string(),
            context: Vec::new(),
            sources: Vec::new(),
            query: query.to_string(),
        }
    }
}

/// Simple measurements comparing the two answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonMetrics {
    /// Whether the RAG answer used any source.
    pub rag_has_sources: bool,
    /// Length of the RAG answer in characters.
    pub rag_answer_length: usize,
    /// Length of the plain answer in characters.
    pub non_rag_answer_length: usize,
}

/// RAG and plain answers to the same question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonOutcome {
    /// Question asked.
    pub query: String,
    /// Answer grounded in retrieved chunks.
    pub rag_answer: String,
    /// Answer from the model alone.
    pub non_rag_answer: String,
    /// Sources behind the RAG answer.
    pub rag_sources: Vec<SourceInfo>,
    /// Number of context chunks used by the RAG answer.
    pub rag_context_count: usize,
    /// Length and grounding comparison.
    pub comparison: ComparisonMetrics,
}

/// Index and activity statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagStats {
    /// Index size and location.
    #[serde(flatten)]
    pub index: IndexStats,
    /// Similarity threshold applied to retrieved chunks.
    pub min_similarity: f32,
    /// Activity counters since startup.
    pub metrics: MetricsSnapshot,
}
