//! Sentence-boundary text chunker.
//!
//! Splits document text into overlapping windows of a fixed character size.
//! A raw window boundary is pulled back to the nearest sentence-terminal
//! character (`.`, `!`, `?`) when one occurs within the last 100 characters
//! of the window, so chunks tend to end on sentence boundaries.
//!
//! All positions are character offsets, not byte offsets: documents in this
//! pipeline are frequently Cyrillic and byte-based slicing would split
//! multi-byte code points.

use anyhow::{bail, Result};

use crate::models::Chunk;

/// How far back from the raw window boundary to look for a sentence end.
const BOUNDARY_LOOKBACK: usize = 100;

/// Configured chunker. Construction validates the size/overlap pair.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Creates a chunker.
    ///
    /// Rejects `overlap >= chunk_size` (the cursor could not advance) and
    /// `chunk_size == 0` before any text is processed.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if overlap >= chunk_size {
            bail!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into overlapping chunks.
    ///
    /// Chunk ids are assigned sequentially in emission order with no gaps,
    /// even when a raw window trims down to nothing and is skipped. The
    /// next window starts at `end - overlap`, measured from the actual
    /// (possibly sentence-adjusted) end, so the realized overlap varies
    /// when a sentence boundary was used.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut chunk_id: i64 = 0;

        while start < total {
            let mut end = (start + self.chunk_size).min(total);

            // Not the final window: prefer cutting just after a sentence end.
            if start + self.chunk_size < total {
                let raw_end = start + self.chunk_size;
                let floor = raw_end.saturating_sub(BOUNDARY_LOOKBACK).max(start);
                for i in (floor + 1..=raw_end).rev() {
                    if matches!(chars[i], '.' | '!' | '?') {
                        end = i + 1;
                        break;
                    }
                }
            }

            let slice: String = chars[start..end.min(total)].iter().collect();
            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                chunks.push(Chunk {
                    chunk_id,
                    start,
                    end,
                    text: trimmed.to_string(),
                });
                chunk_id += 1;
            }

            if end < total {
                // Guarantee forward progress even if a sentence boundary
                // landed closer to `start` than the configured overlap, or
                // within the first `overlap` chars of the text.
                start = end.saturating_sub(self.overlap).max(start + 1);
            } else {
                start = total;
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize, sentence_len: usize) -> String {
        // Builds text of `n` sentences, each exactly `sentence_len` chars
        // including the trailing period and space.
        let body = "a".repeat(sentence_len - 2);
        (0..n).map(|_| format!("{}. ", body)).collect()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(1000, 200).unwrap();
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk_spanning_all() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk("A short document.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, 0);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text, "A short document.");
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn rejects_overlap_equal_to_chunk_size() {
        assert!(Chunker::new(500, 500).is_err());
    }

    #[test]
    fn rejects_overlap_larger_than_chunk_size() {
        assert!(Chunker::new(100, 150).is_err());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(Chunker::new(0, 0).is_err());
    }

    #[test]
    fn twenty_four_hundred_chars_make_three_chunks() {
        // 2400 chars of 40-char sentences, chunk_size 1000, overlap 200.
        let text = sentences(60, 40);
        assert_eq!(text.chars().count(), 2400);

        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 3);

        // Every non-final chunk ends just after a sentence terminal, since a
        // period always falls within the 100-char lookback here.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.text.ends_with('.'),
                "chunk {} should end at a sentence boundary: {:?}",
                chunk.chunk_id,
                &chunk.text[chunk.text.len().saturating_sub(20)..]
            );
        }
    }

    #[test]
    fn chunk_ids_are_contiguous() {
        let text = sentences(200, 30);
        let chunker = Chunker::new(500, 100).unwrap();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i as i64);
        }
    }

    #[test]
    fn starts_are_monotonically_increasing() {
        let text = sentences(100, 25);
        let chunker = Chunker::new(400, 80).unwrap();
        let chunks = chunker.chunk(&text);
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].start < pair[0].end, "windows should overlap");
        }
    }

    #[test]
    fn spans_reconstruct_original_text() {
        // Concatenating spans and deduplicating the overlap regions must
        // reproduce the source text (modulo per-chunk trimming).
        let text = sentences(80, 30);
        let chars: Vec<char> = text.chars().collect();
        let chunker = Chunker::new(600, 150).unwrap();
        let chunks = chunker.chunk(&text);

        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for chunk in &chunks {
            let from = chunk.start.max(covered);
            rebuilt.extend(&chars[from..chunk.end.min(chars.len())]);
            covered = chunk.end;
        }
        assert_eq!(rebuilt.trim(), text.trim());
    }

    #[test]
    fn cyrillic_text_does_not_panic_and_respects_char_offsets() {
        let text = "Требования к материалам изложены в разделе три. ".repeat(40);
        let chunker = Chunker::new(300, 60).unwrap();
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.trim().is_empty());
            assert!(chunk.end <= text.chars().count());
        }
    }

    #[test]
    fn early_sentence_boundary_with_large_overlap_advances() {
        // A sentence end in the very first chars pulls the cut below the
        // overlap; the cursor must still move forward and the rest of the
        // text must still be chunked.
        let text = format!("a.{}", "b".repeat(100));
        let chunker = Chunker::new(50, 40).unwrap();
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks[0].text, "a.");
        assert_eq!(chunks.last().unwrap().end, text.chars().count());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i as i64);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn overlap_measured_from_adjusted_end() {
        // One long sentence then short ones: the first cut falls back to the
        // raw boundary, later cuts use sentence ends. The next start must be
        // end - overlap in both cases.
        let text = sentences(50, 20);
        let chunker = Chunker::new(200, 50).unwrap();
        let chunks = chunker.chunk(&text);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start, pair[0].end - 50);
        }
    }
}
