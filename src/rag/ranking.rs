//! Similarity-threshold filtering and top-K re-ranking of search hits.

use crate::index::SearchHit;

/// How many candidates to pull from the index for a request of `top_k`.
///
/// The index is over-sampled so that the threshold filter still leaves `top_k` results in the
/// common case.
pub fn candidate_pool_size(top_k: usize) -> usize {
    top_k.saturating_mul(2)
}

/// Drop hits below `min_similarity` and order the rest by similarity, best first.
///
/// The sort is stable, so equally similar hits keep their search order. Ranks are renumbered
/// from 1.
pub fn filter_and_rank(hits: Vec<SearchHit>, min_similarity: f32) -> Vec<SearchHit> {
    let mut kept: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| hit.similarity >= min_similarity)
        .collect();
    kept.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    renumber(&mut kept);
    kept
}

/// Keep the `k` best hits of an already ranked list.
pub fn select_top_k(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.truncate(k);
    hits
}

/// Full post-retrieval pipeline: threshold, re-rank, truncate.
pub fn rank_candidates(hits: Vec<SearchHit>, min_similarity: f32, top_k: usize) -> Vec<SearchHit> {
    select_top_k(filter_and_rank(hits, min_similarity), top_k)
}

fn renumber(hits: &mut [SearchHit]) {
    for (position, hit) in hits.iter_mut().enumerate() {
        hit.rank = position + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkRecord;
    use crate::processing::{Chunk, DocumentChunk};

    fn hit(rank: usize, similarity: f32, text: &str) -> SearchHit {
        SearchHit {
            rank,
            distance: 1.0 / similarity - 1.0,
            similarity,
            record: ChunkRecord {
                chunk: DocumentChunk {
                    chunk: Chunk {
                        chunk_id: rank,
                        text: text.into(),
                        start_char: 0,
                        end_char: 0,
                        char_count: 0,
                    },
                    source: "doc.pdf".into(),
                    source_path: "doc.pdf".into(),
                },
                chunk_hash: String::new(),
                ingested_at: String::new(),
            },
        }
    }

    fn texts(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter()
            .map(|hit| hit.record.chunk.chunk.text.as_str())
            .collect()
    }

    #[test]
    fn hits_below_threshold_are_dropped() {
        let ranked = filter_and_rank(
            vec![hit(1, 0.9, "a"), hit(2, 0.29, "b"), hit(3, 0.3, "c")],
            0.3,
        );
        assert_eq!(texts(&ranked), vec!["a", "c"]);
        let ranks: Vec<usize> = ranked.iter().map(|hit| hit.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn ranking_is_by_descending_similarity_and_stable() {
        let ranked = filter_and_rank(
            vec![
                hit(1, 0.5, "first-half"),
                hit(2, 0.8, "best"),
                hit(3, 0.5, "second-half"),
            ],
            0.0,
        );
        assert_eq!(texts(&ranked), vec!["best", "first-half", "second-half"]);
    }

    #[test]
    fn top_k_truncates_after_filtering() {
        let ranked = rank_candidates(
            vec![
                hit(1, 0.9, "a"),
                hit(2, 0.1, "noise"),
                hit(3, 0.8, "b"),
                hit(4, 0.7, "c"),
            ],
            0.3,
            2,
        );
        assert_eq!(texts(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn pool_is_twice_top_k() {
        assert_eq!(candidate_pool_size(3), 6);
        assert_eq!(candidate_pool_size(usize::MAX), usize::MAX);
    }
}
