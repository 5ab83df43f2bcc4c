//! Local flat vector index with file persistence.

pub mod flat;
pub mod persist;
pub mod types;

pub use flat::FlatIndex;
pub use types::{ChunkRecord, IndexError, IndexStats, SearchHit};
