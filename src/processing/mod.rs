//! Document processing: PDF text extraction and overlapping chunking.

pub mod chunking;
pub mod pdf;
pub mod types;

pub use chunking::TextChunker;
pub use pdf::load_pdf;
pub use types::{Chunk, ChunkingError, DocumentChunk, DocumentError};

use std::path::Path;

/// Loads documents and cuts them into source-annotated chunks.
#[derive(Debug, Clone, Copy)]
pub struct DocumentProcessor {
    chunker: TextChunker,
}

impl DocumentProcessor {
    /// Build a processor with the given window size and overlap, both in characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        Ok(Self {
            chunker: TextChunker::new(chunk_size, chunk_overlap)?,
        })
    }

    /// Extract the text of a PDF.
    pub fn load_pdf(&self, path: &Path) -> Result<String, DocumentError> {
        load_pdf(path)
    }

    /// Split text into chunks without source annotations.
    pub fn chunk_text(&self, text: &str) -> Result<Vec<Chunk>, ChunkingError> {
        self.chunker.chunk_text(text)
    }

    /// Load a PDF, chunk it, and tag every chunk with the file name and path.
    pub fn process_pdf(&self, path: &Path) -> Result<Vec<DocumentChunk>, DocumentError> {
        let text = self.load_pdf(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let chunks = self.process_text(&text, &source, &path.display().to_string())?;
        tracing::info!(path = %path.display(), chunks = chunks.len(), "Processed PDF");
        Ok(chunks)
    }

    /// Chunk already-extracted text and tag every chunk with the given source.
    pub fn process_text(
        &self,
        text: &str,
        source: &str,
        source_path: &str,
    ) -> Result<Vec<DocumentChunk>, DocumentError> {
        let chunks = self.chunk_text(text)?;
        Ok(chunks
            .into_iter()
            .map(|chunk| DocumentChunk {
                chunk,
                source: source.to_string(),
                source_path: source_path.to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_text_annotates_every_chunk() {
        let processor = DocumentProcessor::new(12, 2).unwrap();
        let chunks = processor
            .process_text("First line.\nSecond line.\nThird.", "notes.pdf", "docs/notes.pdf")
            .unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.source, "notes.pdf");
            assert_eq!(chunk.source_path, "docs/notes.pdf");
        }
    }

    #[test]
    fn process_pdf_propagates_missing_file() {
        let processor = DocumentProcessor::new(100, 10).unwrap();
        let error = processor.process_pdf(Path::new("missing.pdf")).unwrap_err();
        assert!(matches!(error, DocumentError::NotFound(_)));
    }

    #[test]
    fn empty_text_surfaces_as_chunking_error() {
        let processor = DocumentProcessor::new(100, 10).unwrap();
        let error = processor.process_text("   ", "a.pdf", "a.pdf").unwrap_err();
        assert!(matches!(error, DocumentError::Chunking(ChunkingError::EmptyText)));
    }

    #[test]
    fn serialized_chunk_is_flat() {
        let processor = DocumentProcessor::new(100, 10).unwrap();
        let chunks = processor.process_text("Hello.", "a.pdf", "dir/a.pdf").unwrap();
        let value = serde_json::to_value(&chunks[0]).unwrap();
        assert_eq!(value["chunk_id"], 0);
        assert_eq!(value["text"], "Hello.");
        assert_eq!(value["source"], "a.pdf");
    }
}
