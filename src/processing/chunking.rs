//! Character-window chunking with sentence-boundary preservation.
//!
//! Text is cut into windows of `chunk_size` characters. When a window ends inside the document,
//! the chunker looks back for the last `.` or newline and ends the window just after it, as long
//! as that boundary lies in the second half of the window. Consecutive windows share
//! `chunk_overlap` characters so that sentences straddling a cut stay retrievable.
//!
//! Offsets count Unicode scalar values, never bytes, so multi-byte text is never split inside a
//! character.

use super::types::{Chunk, ChunkingError};

/// Splits text into overlapping character windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Build a chunker, rejecting settings under which the window could not advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into chunks.
    ///
    /// Windows that contain only whitespace are skipped; chunk ids stay contiguous over the
    /// chunks that are kept. Iteration stops once a window reaches the end of the text, so the
    /// final chunk is never a pure copy of the previous overlap.
    pub fn chunk_text(&self, text: &str) -> Result<Vec<Chunk>, ChunkingError> {
        if text.trim().is_empty() {
            return Err(ChunkingError::EmptyText);
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let end = self.window_end(&chars, start);
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();

            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    chunk_id: chunks.len(),
                    text: trimmed.to_string(),
                    start_char: start,
                    end_char: end,
                    char_count: end - start,
                });
            }

            if end >= len {
                break;
            }
            start = end - self.chunk_overlap;
        }

        tracing::debug!(
            characters = len,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.chunk_overlap,
            "Chunked text"
        );
        Ok(chunks)
    }

    fn window_end(&self, chars: &[char], start: usize) -> usize {
        let end = (start + self.chunk_size).min(chars.len());
        if end == chars.len() {
            return end;
        }

        // The cut must land past mid-window and beyond the overlap, otherwise `start` would
        // not move forward.
        match last_boundary(&chars[start..end]) {
            Some(boundary)
                if boundary * 2 > self.chunk_size && boundary + 1 > self.chunk_overlap =>
            {
                start + boundary + 1
            }
            _ => end,
        }
    }
}

fn last_boundary(window: &[char]) -> Option<usize> {
    window.iter().rposition(|c| matches!(c, '.' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(chunks: &[Chunk]) -> Vec<(usize, usize)> {
        chunks
            .iter()
            .map(|chunk| (chunk.start_char, chunk.end_char))
            .collect()
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunker = TextChunker::new(100, 10).unwrap();
        let chunks = chunker.chunk_text("  A short note.  ").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short note.");
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[0].char_count, 17);
    }

    #[test]
    fn windows_end_at_sentence_boundary_and_overlap() {
        let chunker = TextChunker::new(20, 5).unwrap();
        let text = "Alpha beta gamma. Delta epsilon zeta eta theta.";
        let chunks = chunker.chunk_text(text).unwrap();

        assert_eq!(offsets(&chunks), vec![(0, 17), (12, 32), (27, 47)]);
        assert_eq!(chunks[0].text, "Alpha beta gamma.");
        assert_eq!(chunks[1].text, "amma. Delta epsilon");
        assert_eq!(chunks[2].text, "ilon zeta eta theta.");
        let ids: Vec<usize> = chunks.iter().map(|chunk| chunk.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn newlines_count_as_boundaries() {
        let chunker = TextChunker::new(10, 0).unwrap();
        let chunks = chunker
            .chunk_text("line one\nline two\nline three")
            .unwrap();
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["line one", "line two", "line three"]);
    }

    #[test]
    fn early_boundary_is_ignored() {
        let chunker = TextChunker::new(10, 0).unwrap();
        let chunks = chunker.chunk_text("Hi. abcdefghijklmnop").unwrap();
        assert_eq!(chunks[0].text, "Hi. abcdef");
        assert_eq!(chunks[0].end_char, 10);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let chunker = TextChunker::new(5, 0).unwrap();
        let chunks = chunker.chunk_text("héllo wörld").unwrap();
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["héllo", "wörl", "d"]);
        assert_eq!(offsets(&chunks), vec![(0, 5), (5, 10), (10, 11)]);
    }

    #[test]
    fn text_of_exact_window_length_is_not_duplicated() {
        let chunker = TextChunker::new(10, 4).unwrap();
        let chunks = chunker.chunk_text("abcdefghij").unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn large_overlap_still_advances() {
        let chunker = TextChunker::new(10, 8).unwrap();
        let chunks = chunker.chunk_text("aaaaaa.bbbbbbbbbbbbbbbbbbbb").unwrap();
        for pair in chunks.windows(2) {
            assert!(pair[1].start_char > pair[0].start_char);
        }
        assert_eq!(chunks.last().map(|chunk| chunk.end_char), Some(27));
    }

    #[test]
    fn whitespace_windows_are_skipped() {
        let chunker = TextChunker::new(4, 0).unwrap();
        let chunks = chunker.chunk_text("abcd        efgh").unwrap();
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh"]);
        assert_eq!(chunks[1].chunk_id, 1);
    }

    #[test]
    fn empty_text_is_rejected() {
        let chunker = TextChunker::new(10, 2).unwrap();
        assert_eq!(chunker.chunk_text(" \n\t ").unwrap_err(), ChunkingError::EmptyText);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert_eq!(TextChunker::new(0, 0).unwrap_err(), ChunkingError::InvalidChunkSize);
        assert_eq!(
            TextChunker::new(10, 10).unwrap_err(),
            ChunkingError::InvalidOverlap {
                chunk_size: 10,
                overlap: 10
            }
        );
    }
}
