//! Chunk records and error definitions for document processing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// The chunker was configured with a zero-sized window.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// The overlap would stop the window from advancing.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap {
        /// Configured window size.
        chunk_size: usize,
        /// Configured overlap.
        overlap: usize,
    },
    /// Input contained no visible characters.
    #[error("Text cannot be empty")]
    EmptyText,
}

/// Errors emitted while loading and chunking documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The requested PDF does not exist on disk.
    #[error("PDF file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The PDF exists but could not be read.
    #[error("Failed to read PDF {}: {source}", path.display())]
    Io {
        /// File we attempted to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The PDF parser rejected the document.
    #[error("Failed to load PDF: {0}")]
    Extraction(String),
    /// Extracted text could not be chunked.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
}

/// A character window of a document, with offsets into the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential position of the chunk within its document.
    pub chunk_id: usize,
    /// Window text with surrounding whitespace removed.
    pub text: String,
    /// Offset of the first character of the window.
    pub start_char: usize,
    /// Offset one past the last character of the window.
    pub end_char: usize,
    /// Number of characters in the window before trimming.
    pub char_count: usize,
}

/// Chunk annotated with the document it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Chunk body and offsets.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// File name of the source document.
    pub source: String,
    /// Path the document was loaded from.
    pub source_path: String,
}
