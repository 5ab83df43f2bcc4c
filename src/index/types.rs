//! Shared types for the flat vector index.

use crate::processing::DocumentChunk;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by index mutation, search, and persistence.
#[derive(Debug, Error)]
pub enum IndexError {
    /// `add` was called without vectors.
    #[error("Embeddings list cannot be empty")]
    EmptyInput,
    /// Vectors and metadata do not pair up.
    #[error("Embeddings count ({embeddings}) must match metadata count ({metadata})")]
    CountMismatch {
        /// Number of vectors supplied.
        embeddings: usize,
        /// Number of metadata records supplied.
        metadata: usize,
    },
    /// A vector's length differs from the index dimension.
    #[error("Vector dimension {actual} doesn't match index dimension {expected}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Loaded metadata does not cover every stored vector, so new records would misalign.
    #[error("Index holds {vectors} vectors but only {records} metadata records")]
    MetadataOutOfSync {
        /// Number of stored vectors.
        vectors: usize,
        /// Number of stored metadata records.
        records: usize,
    },
    /// Search was attempted before any vector was stored.
    #[error("Index is empty. Please ingest a document first.")]
    Empty,
    /// Persistence was requested but no path is configured.
    #[error("No index path provided")]
    MissingPath,
    /// Index file does not exist.
    #[error("Index file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Reading or writing an index file failed.
    #[error("Index I/O failed for {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Index file content is not a valid flat index.
    #[error("Corrupt index file {}: {reason}", path.display())]
    Corrupt {
        /// File that failed validation.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Metadata sidecar could not be encoded or decoded.
    #[error("Index metadata is invalid: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk text, offsets, and source document.
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    /// SHA-256 digest of the chunk text.
    pub chunk_hash: String,
    /// RFC 3339 timestamp of ingestion.
    pub ingested_at: String,
}

/// A stored chunk returned by a nearest-neighbour search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// 1-based position in the result list.
    pub rank: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    /// `1 / (1 + distance)`, in `(0, 1]`.
    pub similarity: f32,
    /// Metadata of the matched chunk.
    pub record: ChunkRecord,
}

/// Snapshot of the index size and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of stored vectors.
    pub total_vectors: usize,
    /// Dimension of every stored vector.
    pub dimension: usize,
    /// Persistence path, when configured.
    pub index_path: Option<String>,
}
