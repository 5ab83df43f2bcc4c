//! On-disk layout of the flat index.
//!
//! Vectors live in one binary file: an 8-byte magic, the dimension as `u32`, the vector count as
//! `u64`, then `count * dimension` little-endian `f32` values. Metadata lives next to it in a
//! JSON sidecar whose name replaces the file extension with `metadata.json`.

use super::types::{ChunkRecord, IndexError};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"FLATL2\0\0";
const HEADER_LEN: usize = MAGIC.len() + 4 + 8;

/// Path of the metadata sidecar belonging to the vector file at `path`.
pub fn metadata_path(path: &Path) -> PathBuf {
    path.with_extension("metadata.json")
}

/// Serialized form of an index, ready to be written.
pub(crate) struct EncodedIndex {
    vectors: Vec<u8>,
    metadata: Vec<u8>,
}

pub(crate) fn encode(
    dimension: usize,
    vectors: &[f32],
    records: &[ChunkRecord],
) -> Result<EncodedIndex, IndexError> {
    let count = vectors.len() / dimension;
    let mut bytes = Vec::with_capacity(HEADER_LEN + vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    Ok(EncodedIndex {
        vectors: bytes,
        metadata: serde_json::to_vec(records)?,
    })
}

pub(crate) async fn write(path: &Path, encoded: &EncodedIndex) -> Result<(), IndexError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| IndexError::Io { path, source }
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }
    tokio::fs::write(path, &encoded.vectors)
        .await
        .map_err(io_error(path))?;

    let sidecar = metadata_path(path);
    tokio::fs::write(&sidecar, &encoded.metadata)
        .await
        .map_err(io_error(&sidecar))?;

    tracing::info!(
        path = %path.display(),
        metadata = %sidecar.display(),
        bytes = encoded.vectors.len(),
        "Saved index"
    );
    Ok(())
}

/// Vectors and metadata read back from disk.
pub(crate) struct LoadedIndex {
    pub(crate) dimension: usize,
    pub(crate) vectors: Vec<f32>,
    pub(crate) records: Vec<ChunkRecord>,
}

pub(crate) fn read(path: &Path) -> Result<LoadedIndex, IndexError> {
    if !path.exists() {
        return Err(IndexError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (dimension, vectors) = decode_vectors(path, &bytes)?;

    let sidecar = metadata_path(path);
    let records = if sidecar.exists() {
        let raw = std::fs::read(&sidecar).map_err(|source| IndexError::Io {
            path: sidecar.clone(),
            source,
        })?;
        serde_json::from_slice(&raw)?
    } else {
        tracing::warn!(path = %sidecar.display(), "Metadata file not found");
        Vec::new()
    };

    Ok(LoadedIndex {
        dimension,
        vectors,
        records,
    })
}

fn decode_vectors(path: &Path, bytes: &[u8]) -> Result<(usize, Vec<f32>), IndexError> {
    let corrupt = |reason: &str| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("missing flat index header"));
    }
    let (dimension_bytes, rest) = bytes[MAGIC.len()..].split_at(4);
    let (count_bytes, data) = rest.split_at(8);
    let dimension = u32::from_le_bytes(
        dimension_bytes
            .try_into()
            .map_err(|_| corrupt("truncated dimension"))?,
    ) as usize;
    let count = u64::from_le_bytes(count_bytes.try_into().map_err(|_| corrupt("truncated count"))?);

    if dimension == 0 {
        return Err(corrupt("dimension is zero"));
    }
    let expected = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(dimension))
        .and_then(|values| values.checked_mul(4))
        .ok_or_else(|| corrupt("vector count overflows"))?;
    if data.len() != expected {
        return Err(corrupt("vector data length does not match header"));
    }

    let vectors = data
        .chunks_exact(4)
        .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        .collect();
    Ok((dimension, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_replaces_extension() {
        assert_eq!(
            metadata_path(Path::new("data/vector_index")),
            PathBuf::from("data/vector_index.metadata.json")
        );
        assert_eq!(
            metadata_path(Path::new("data/index.bin")),
            PathBuf::from("data/index.metadata.json")
        );
    }

    #[test]
    fn header_round_trips_vectors() {
        let encoded = encode(2, &[1.0, -2.5, 0.25, 4.0], &[]).unwrap();
        let (dimension, vectors) = decode_vectors(Path::new("mem"), &encoded.vectors).unwrap();
        assert_eq!(dimension, 2);
        assert_eq!(vectors, vec![1.0, -2.5, 0.25, 4.0]);
    }

    #[test]
    fn truncated_data_is_corrupt() {
        let encoded = encode(2, &[1.0, 2.0], &[]).unwrap();
        let truncated = &encoded.vectors[..encoded.vectors.len() - 1];
        assert!(matches!(
            decode_vectors(Path::new("mem"), truncated),
            Err(IndexError::Corrupt { .. })
        ));
        assert!(matches!(
            decode_vectors(Path::new("mem"), b"not an index at all"),
            Err(IndexError::Corrupt { .. })
        ));
    }
}
