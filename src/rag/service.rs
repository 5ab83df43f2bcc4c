//! RAG orchestrator coordinating document processing, embedding, retrieval, and completion.

use crate::{
    completion::{CompletionClient, OpenAiCompletionClient},
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, OpenAiEmbeddingClient},
    index::{ChunkRecord, FlatIndex},
    metrics::RagMetrics,
    processing::{DocumentChunk, DocumentError, DocumentProcessor},
    rag::{
        prompts::{EntityAlias, build_rag_prompt_with_sources, enhance_query_for_entity_resolution},
        ranking::{candidate_pool_size, rank_candidates},
        types::{
            ComparisonMetrics, ComparisonOutcome, IngestOutcome, QueryOutcome, RagError, RagStats,
            SourceInfo,
        },
    },
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::RwLock;
use walkdir::WalkDir;

/// Tunables of the retrieval path.
#[derive(Debug, Clone)]
pub struct RagSettings {
    /// Minimum similarity a chunk needs to reach the prompt.
    pub min_similarity: f32,
    /// Largest accepted top-K.
    pub max_top_k: usize,
    /// Largest accepted query, in characters.
    pub max_query_length: usize,
    /// Entity aliases used to enrich retrieval queries.
    pub entity_aliases: Vec<EntityAlias>,
}

impl RagSettings {
    /// Derive settings from the runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_similarity: config.min_similarity,
            max_top_k: config.max_top_k,
            max_query_length: config.max_message_length,
            entity_aliases: config.entity_aliases.clone(),
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            min_similarity: 0.3,
            max_top_k: 10,
            max_query_length: 10_000,
            entity_aliases: Vec::new(),
        }
    }
}

/// Runs ingestion (process → embed → index) and question answering
/// (enhance → embed → retrieve → rank → prompt → complete).
///
/// The index sits behind an async `RwLock`: queries share it, ingestion takes it exclusively
/// while appending and persisting. Build one service at startup and share it through an `Arc`.
pub struct RagService {
    processor: DocumentProcessor,
    embedder: Arc<dyn EmbeddingClient>,
    completion: Arc<dyn CompletionClient>,
    index: RwLock<FlatIndex>,
    settings: RagSettings,
    metrics: RagMetrics,
}

/// Abstraction over the RAG pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Ingest the PDF at `pdf_path`.
    async fn ingest_document(&self, pdf_path: &Path) -> Result<IngestOutcome, RagError>;

    /// Answer `query` from the `top_k` most relevant chunks.
    async fn query(&self, query: &str, top_k: usize) -> Result<QueryOutcome, RagError>;

    /// Answer `query` with and without retrieval.
    async fn compare(&self, query: &str, top_k: usize) -> Result<ComparisonOutcome, RagError>;

    /// Index and activity statistics.
    async fn stats(&self) -> RagStats;
}

impl RagService {
    /// Assemble a service from its parts.
    pub fn new(
        processor: DocumentProcessor,
        embedder: Arc<dyn EmbeddingClient>,
        completion: Arc<dyn CompletionClient>,
        index: FlatIndex,
        settings: RagSettings,
    ) -> Self {
        Self {
            processor,
            embedder,
            completion,
            index: RwLock::new(index),
            settings,
            metrics: RagMetrics::new(),
        }
    }

    /// Build the OpenAI-backed service described by `config`, loading any persisted index.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        let processor = DocumentProcessor::new(config.chunk_size, config.chunk_overlap)
            .map_err(DocumentError::from)?;
        tracing::info!("Initializing embedding client");
        let embedder = OpenAiEmbeddingClient::new(
            config.openai_base_url.as_str(),
            config.openai_api_key.as_str(),
            config.embedding_model.as_str(),
            config.embedding_dimension,
        )?;
        let completion = OpenAiCompletionClient::new(
            config.openai_base_url.as_str(),
            config.openai_api_key.as_str(),
            config.openai_model.as_str(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.stream_timeout_secs),
        )?;
        let index = FlatIndex::open(config.embedding_dimension, config.index_path.clone())?;
        tracing::info!(vectors = index.len(), model = %config.openai_model, "RAG service ready");

        Ok(Self::new(
            processor,
            Arc::new(embedder),
            Arc::new(completion),
            index,
            RagSettings::from_config(config),
        ))
    }

    /// Completion client shared with the plain LLM endpoints.
    pub fn completion_client(&self) -> Arc<dyn CompletionClient> {
        Arc::clone(&self.completion)
    }

    /// Load, chunk, embed, and index a PDF, persisting the index when a path is configured.
    pub async fn ingest_document(&self, pdf_path: &Path) -> Result<IngestOutcome, RagError> {
        tracing::info!(path = %pdf_path.display(), "Starting document ingestion");
        let processor = self.processor;
        let path = pdf_path.to_path_buf();
        // PDF parsing is CPU-bound and synchronous.
        let chunks = tokio::task::spawn_blocking(move || processor.process_pdf(&path)).await??;
        let source = chunks
            .first()
            .map(|chunk| chunk.source.clone())
            .unwrap_or_default();
        self.ingest_chunks(chunks, source).await
    }

    /// Chunk, embed, and index text that was extracted elsewhere.
    pub async fn ingest_text(&self, text: &str, source: &str) -> Result<IngestOutcome, RagError> {
        let chunks = self.processor.process_text(text, source, source)?;
        self.ingest_chunks(chunks, source.to_string()).await
    }

    /// Ingest every `.pdf` file below `dir`, in path order. Stops at the first failure.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<IngestOutcome>, RagError> {
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_pdf(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(RagError::NoDocuments(dir.to_path_buf()));
        }

        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            outcomes.push(self.ingest_document(&path).await?);
        }
        Ok(outcomes)
    }

    async fn ingest_chunks(
        &self,
        chunks: Vec<DocumentChunk>,
        source: String,
    ) -> Result<IngestOutcome, RagError> {
        let chunks_created = chunks.len();
        let (records, skipped_duplicates) = prepare_records(chunks, &current_timestamp_rfc3339());
        let texts: Vec<String> = records
            .iter()
            .map(|record| record.chunk.chunk.text.clone())
            .collect();

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(EmbeddingClientError::CountMismatch {
                expected: records.len(),
                actual: embeddings.len(),
            }
            .into());
        }
        let embeddings_generated = embeddings.len();

        let total_vectors = {
            let mut index = self.index.write().await;
            index.add_and_save(embeddings, records).await?;
            index.len()
        };

        self.metrics.record_document(embeddings_generated as u64);
        tracing::info!(
            source = %source,
            chunks = chunks_created,
            embeddings = embeddings_generated,
            skipped_duplicates,
            total_vectors,
            "Document ingested"
        );

        Ok(IngestOutcome {
            status: "success".to_string(),
            chunks_created,
            embeddings_generated,
            skipped_duplicates,
            total_vectors,
            source,
        })
    }

    /// Answer `query` from the most relevant indexed chunks.
    ///
    /// The entity-enriched query drives retrieval; the prompt uses the query as asked. When no
    /// chunk clears the similarity threshold the model is not called.
    pub async fn query(&self, query: &str, top_k: usize) -> Result<QueryOutcome, RagError> {
        let query = self.validate_query(query)?;
        self.validate_top_k(top_k)?;
        tracing::info!(top_k, "Processing RAG query");

        let enhanced = enhance_query_for_entity_resolution(query, &self.settings.entity_aliases);
        if enhanced != query {
            tracing::debug!(enhanced = %enhanced, "Enhanced query");
        }
        let vector = self.embedder.embed(&enhanced).await?;

        let candidates = self
            .index
            .read()
            .await
            .search(&vector, candidate_pool_size(top_k))?;
        let candidate_count = candidates.len();
        let ranked = rank_candidates(candidates, self.settings.min_similarity, top_k);
        tracing::debug!(
            candidates = candidate_count,
            kept = ranked.len(),
            min_similarity = self.settings.min_similarity,
            "Ranked retrieval candidates"
        );

        if ranked.is_empty() {
            self.metrics.record_query(false);
            tracing::info!("No chunk met the similarity threshold");
            return Ok(QueryOutcome::without_context(query));
        }

        let context: Vec<String> = ranked
            .iter()
            .map(|hit| hit.record.chunk.chunk.text.clone())
            .collect();
        let sources = ranked
            .iter()
            .map(|hit| SourceInfo {
                source: hit.record.chunk.source.clone(),
                chunk_id: hit.record.chunk.chunk.chunk_id,
                similarity_score: hit.similarity,
            })
            .collect();

        let prompt = build_rag_prompt_with_sources(&context, query);
        let answer = self.completion.ask(&prompt, None).await?;
        self.metrics.record_query(true);

        Ok(QueryOutcome {
            answer,
            context,
            sources,
            query: query.to_string(),
        })
    }

    /// Answer `query` with the model alone.
    pub async fn query_without_rag(&self, query: &str) -> Result<String, RagError> {
        let query = self.validate_query(query)?;
        tracing::info!("Processing query without retrieval");
        Ok(self.completion.ask(query, None).await?)
    }

    /// Answer `query` with and without retrieval, concurrently.
    pub async fn compare(&self, query: &str, top_k: usize) -> Result<ComparisonOutcome, RagError> {
        let query = self.validate_query(query)?;
        self.validate_top_k(top_k)?;
        tracing::info!(top_k, "Comparing RAG and plain answers");

        let (rag, non_rag_answer) =
            tokio::try_join!(self.query(query, top_k), self.query_without_rag(query))?;

        Ok(ComparisonOutcome {
            query: query.to_string(),
            comparison: ComparisonMetrics {
                rag_has_sources: !rag.sources.is_empty(),
                rag_answer_length: rag.answer.chars().count(),
                non_rag_answer_length: non_rag_answer.chars().count(),
            },
            rag_context_count: rag.context.len(),
            rag_answer: rag.answer,
            rag_sources: rag.sources,
            non_rag_answer,
        })
    }

    /// Index size and activity counters.
    pub async fn stats(&self) -> RagStats {
        RagStats {
            index: self.index.read().await.stats(),
            min_similarity: self.settings.min_similarity,
            metrics: self.metrics.snapshot(),
        }
    }

    fn validate_query<'q>(&self, query: &'q str) -> Result<&'q str, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("Query cannot be empty".into()));
        }
        if query.chars().count() > self.settings.max_query_length {
            return Err(RagError::InvalidRequest(format!(
                "Query exceeds {} characters",
                self.settings.max_query_length
            )));
        }
        Ok(query)
    }

    fn validate_top_k(&self, top_k: usize) -> Result<(), RagError> {
        if top_k == 0 || top_k > self.settings.max_top_k {
            return Err(RagError::InvalidRequest(format!(
                "top_k must be between 1 and {}",
                self.settings.max_top_k
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_document(&self, pdf_path: &Path) -> Result<IngestOutcome, RagError> {
        RagService::ingest_document(self, pdf_path).await
    }

    async fn query(&self, query: &str, top_k: usize) -> Result<QueryOutcome, RagError> {
        RagService::query(self, query, top_k).await
    }

    async fn compare(&self, query: &str, top_k: usize) -> Result<ComparisonOutcome, RagError> {
        RagService::compare(self, query, top_k).await
    }

    async fn stats(&self) -> RagStats {
        RagService::stats(self).await
    }
}

/// Hash chunks and drop repeats within the document, keeping the first occurrence.
fn prepare_records(chunks: Vec<DocumentChunk>, ingested_at: &str) -> (Vec<ChunkRecord>, usize) {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for chunk in chunks {
        let hash = compute_chunk_hash(&chunk.chunk.text);
        if seen.insert(hash.clone()) {
            records.push(ChunkRecord {
                chunk,
                chunk_hash: hash,
                ingested_at: ingested_at.to_string(),
            });
        } else {
            skipped += 1;
        }
    }

    (records, skipped)
}

fn compute_chunk_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn current_timestamp_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
