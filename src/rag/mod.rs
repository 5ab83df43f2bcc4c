//! Retrieval-augmented generation: prompts, ranking, and the orchestrating service.

pub mod prompts;
pub mod ranking;
pub mod service;
pub mod types;

pub use prompts::{EntityAlias, build_rag_prompt_with_sources, enhance_query_for_entity_resolution};
pub use ranking::{candidate_pool_size, filter_and_rank, rank_candidates, select_top_k};
pub use service::{RagApi, RagService, RagSettings};
pub use types::{
    ComparisonMetrics, ComparisonOutcome, IngestOutcome, NO_CONTEXT_ANSWER, QueryOutcome,
    RagError, RagStats, SourceInfo,
};
