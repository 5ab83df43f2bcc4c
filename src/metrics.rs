use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    queries_answered: AtomicU64,
    queries_without_context: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a RAG query; `grounded` is false when no chunk passed the similarity threshold.
    pub fn record_query(&self, grounded: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if !grounded {
            self.queries_without_context.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_without_context: self.queries_without_context.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks added to the index since startup.
    pub chunks_indexed: u64,
    /// RAG queries answered since startup.
    pub queries_answered: u64,
    /// RAG queries for which no chunk met the similarity threshold.
    pub queries_without_context: u64,
}
