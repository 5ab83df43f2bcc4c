//! Exact nearest-neighbour search over squared Euclidean distance.

use super::persist;
use super::types::{ChunkRecord, IndexError, IndexStats, SearchHit};
use std::path::{Path, PathBuf};

/// In-memory flat index with a parallel metadata list.
///
/// Vectors are stored contiguously; vector `i` pairs with `records[i]`. A search scans every
/// vector, so cost grows linearly with the number of stored chunks.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
    records: Vec<ChunkRecord>,
    path: Option<PathBuf>,
}

impl FlatIndex {
    /// Create an empty in-memory index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            records: Vec::new(),
            path: None,
        }
    }

    /// Open the index persisted at `path`, or start an empty one bound to it.
    pub fn open(dimension: usize, path: Option<PathBuf>) -> Result<Self, IndexError> {
        match path {
            Some(path) if path.exists() => Self::load(dimension, &path),
            other => {
                tracing::info!(dimension, path = ?other, "Initialized new index");
                Ok(Self {
                    path: other,
                    ..Self::new(dimension)
                })
            }
        }
    }

    /// Load an index from disk, checking it matches the expected dimension.
    pub fn load(dimension: usize, path: &Path) -> Result<Self, IndexError> {
        let loaded = persist::read(path)?;
        if loaded.dimension != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: loaded.dimension,
            });
        }
        let index = Self {
            dimension,
            vectors: loaded.vectors,
            records: loaded.records,
            path: Some(path.to_path_buf()),
        };
        if index.records.len() != index.len() {
            tracing::warn!(
                vectors = index.len(),
                records = index.records.len(),
                "Index metadata does not cover every vector"
            );
        }
        tracing::info!(vectors = index.len(), path = %path.display(), "Loaded index");
        Ok(index)
    }

    /// Dimension of the stored vectors.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Persistence path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append vectors with their metadata. Nothing is stored if any input is invalid.
    ///
    /// An index whose metadata does not cover every stored vector refuses new entries.
    pub fn add(
        &mut self,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<(), IndexError> {
        if self.records.len() != self.len() {
            return Err(IndexError::MetadataOutOfSync {
                vectors: self.len(),
                records: self.records.len(),
            });
        }
        if embeddings.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        if embeddings.len() != records.len() {
            return Err(IndexError::CountMismatch {
                embeddings: embeddings.len(),
                metadata: records.len(),
            });
        }
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let added = embeddings.len();
        self.vectors.reserve(added * self.dimension);
        for vector in embeddings {
            self.vectors.extend(vector);
        }
        self.records.extend(records);
        tracing::info!(added, total = self.len(), "Added vectors to index");
        Ok(())
    }

    /// Append vectors and write the index to its configured path.
    ///
    /// If the write fails the appended entries are dropped again, so memory matches disk.
    pub async fn add_and_save(
        &mut self,
        embeddings: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> Result<(), IndexError> {
        let previous = self.len();
        self.add(embeddings, records)?;
        if self.path.is_none() {
            return Ok(());
        }
        if let Err(err) = self.save().await {
            tracing::error!(error = %err, kept = previous, "Index save failed; rolling back");
            self.truncate(previous);
            return Err(err);
        }
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.vectors.truncate(len * self.dimension);
        self.records.truncate(len);
    }

    /// Return up to `k` stored chunks closest to `query`, nearest first.
    ///
    /// Equal distances keep insertion order. Vectors without metadata are skipped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::Empty);
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|vector| squared_l2(query, vector))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let hits: Vec<SearchHit> = scored
            .into_iter()
            .take(k)
            .filter_map(|(position, distance)| {
                self.records.get(position).map(|record| (distance, record))
            })
            .enumerate()
            .map(|(rank, (distance, record))| SearchHit {
                rank: rank + 1,
                distance,
                similarity: 1.0 / (1.0 + distance),
                record: record.clone(),
            })
            .collect();

        tracing::debug!(k, results = hits.len(), "Searched index");
        Ok(hits)
    }

    /// Write the index to its configured path.
    pub async fn save(&self) -> Result<(), IndexError> {
        let path = self.path.as_deref().ok_or(IndexError::MissingPath)?;
        self.save_to(path).await
    }

    /// Write the index to an explicit path.
    pub async fn save_to(&self, path: &Path) -> Result<(), IndexError> {
        let encoded = persist::encode(self.dimension, &self.vectors, &self.records)?;
        persist::write(path, &encoded).await
    }

    /// Size and location summary.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.len(),
            dimension: self.dimension,
            index_path: self.path.as_ref().map(|path| path.display().to_string()),
        }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{Chunk, DocumentChunk};

    fn record(id: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            chunk: DocumentChunk {
                chunk: Chunk {
                    chunk_id: id,
                    text: text.to_string(),
                    start_char: 0,
                    end_char: text.chars().count(),
                    char_count: text.chars().count(),
                },
                source: "doc.pdf".into(),
                source_path: "docs/doc.pdf".into(),
            },
            chunk_hash: format!("hash-{id}"),
            ingested_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn populated() -> FlatIndex {
        let mut index = FlatIndex::new(2);
        index
            .add(
                vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]],
                vec![record(0, "origin"), record(1, "far"), record(2, "near")],
            )
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_distance_and_scores_similarity() {
        let hits = populated().search(&[0.0, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits
            .iter()
            .map(|hit| hit.record.chunk.chunk.text.as_str())
            .collect();
        assert_eq!(texts, vec!["origin", "near", "far"]);

        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[0].similarity, 1.0);
        assert_eq!(hits[1].distance, 1.0);
        assert_eq!(hits[1].similarity, 0.5);
        assert_eq!(hits[2].distance, 25.0);
        assert!((hits[2].similarity - 1.0 / 26.0).abs() < 1e-6);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let hits = populated().search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.last().map(|hit| hit.rank), Some(3));
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = FlatIndex::new(1);
        index
            .add(
                vec![vec![1.0], vec![-1.0]],
                vec![record(0, "right"), record(1, "left")],
            )
            .unwrap();
        let hits = index.search(&[0.0], 2).unwrap();
        assert_eq!(hits[0].record.chunk.chunk.text, "right");
        assert_eq!(hits[1].record.chunk.chunk.text, "left");
    }

    #[test]
    fn empty_index_cannot_be_searched() {
        let index = FlatIndex::new(2);
        assert!(matches!(index.search(&[0.0, 0.0], 1), Err(IndexError::Empty)));
    }

    #[test]
    fn query_dimension_is_checked() {
        let error = populated().search(&[0.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn invalid_additions_leave_index_untouched() {
        let mut index = populated();

        let mismatch = index.add(vec![vec![1.0, 1.0]], vec![]).unwrap_err();
        assert!(matches!(mismatch, IndexError::CountMismatch { .. }));

        let wrong_dimension = index
            .add(
                vec![vec![1.0, 1.0], vec![1.0]],
                vec![record(3, "ok"), record(4, "short")],
            )
            .unwrap_err();
        assert!(matches!(wrong_dimension, IndexError::DimensionMismatch { .. }));

        assert!(matches!(index.add(vec![], vec![]), Err(IndexError::EmptyInput)));
        assert_eq!(index.len(), 3);
    }

    #[tokio::test]
    async fn saved_index_reopens_with_metadata() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("vector_index");

        let mut index = FlatIndex::open(2, Some(path.clone())).unwrap();
        assert!(index.is_empty());
        index
            .add(vec![vec![0.5, 0.5]], vec![record(0, "persisted")])
            .unwrap();
        index.save().await.unwrap();
        assert!(persist::metadata_path(&path).exists());

        let reopened = FlatIndex::open(2, Some(path.clone())).unwrap();
        assert_eq!(reopened.len(), 1);
        let hits = reopened.search(&[0.5, 0.5], 1).unwrap();
        assert_eq!(hits[0].record.chunk.chunk.text, "persisted");
        assert_eq!(
            reopened.stats().index_path,
            Some(path.display().to_string())
        );

        let error = FlatIndex::open(3, Some(path)).unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_metadata_loads_vectors_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("vector_index");
        populated().save_to(&path).await.unwrap();
        std::fs::remove_file(persist::metadata_path(&path)).unwrap();

        let reopened = FlatIndex::load(2, &path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert!(reopened.search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn index_without_full_metadata_refuses_new_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("vector_index");
        populated().save_to(&path).await.unwrap();
        std::fs::remove_file(persist::metadata_path(&path)).unwrap();

        let mut reopened = FlatIndex::load(2, &path).unwrap();
        let error = reopened
            .add(vec![vec![0.0, 0.0]], vec![record(3, "late")])
            .unwrap_err();
        assert!(matches!(
            error,
            IndexError::MetadataOutOfSync {
                vectors: 3,
                records: 0
            }
        ));
        assert_eq!(reopened.len(), 3);
        assert!(reopened.search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_save_rolls_back_added_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let mut index = FlatIndex::open(2, Some(blocker.join("vector_index"))).unwrap();

        let error = index
            .add_and_save(vec![vec![1.0, 1.0]], vec![record(0, "unsaved")])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::Io { .. }));
        assert!(index.is_empty());

        index.path = None;
        index
            .add_and_save(vec![vec![1.0, 1.0]], vec![record(0, "kept")])
            .await
            .unwrap();
        let hits = index.search(&[1.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].record.chunk.chunk.text, "kept");
    }

    #[tokio::test]
    async fn save_without_path_is_rejected() {
        let index = populated();
        assert!(matches!(index.save().await, Err(IndexError::MissingPath)));
    }
}
