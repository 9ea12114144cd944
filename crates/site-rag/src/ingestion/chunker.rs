//! Sentence-aligned sliding-window chunking

use crate::config::ChunkingConfig;

/// Text chunker with configurable size and overlap
///
/// Sizes are measured in characters, not bytes.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between neighbouring chunks
    overlap: usize,
    /// Chunks no longer than this are dropped
    min_size: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
            min_size: 100,
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap).with_min_size(config.min_chunk_size)
    }

    /// Set the minimum chunk size
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Split content into overlapping chunks
    ///
    /// Content that fits in one chunk is returned whole. Otherwise a window of
    /// `chunk_size` slides forward; each cut is pulled back to the nearest sentence
    /// end found within `chunk_size / 2` of the nominal boundary, and the next window
    /// starts `overlap` characters before the cut. A cut keeps the punctuation
    /// sitting exactly on the boundary, so a chunk is at most `chunk_size + 1`
    /// characters.
    pub fn chunk(&self, content: &str) -> Vec<String> {
        let chars: Vec<char> = content.chars().collect();
        let len = chars.len();

        if len <= self.chunk_size {
            let whole = content.trim();
            return if whole.is_empty() {
                Vec::new()
            } else {
                vec![whole.to_string()]
            };
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut start = 0usize;

        while start < len {
            let nominal_end = (start + self.chunk_size).min(len);
            let end = if nominal_end < len {
                self.sentence_cut(&chars, start, nominal_end)
            } else {
                nominal_end
            };

            let text: String = chars[start..end].iter().collect();
            let text = text.trim();
            if text.chars().count() > self.min_size
                && chunks.last().map(String::as_str) != Some(text)
            {
                chunks.push(text.to_string());
            }

            if end >= len {
                break;
            }

            let next = end.saturating_sub(self.overlap);
            // a sentence cut close to `start` must still move the window forward
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Find the cut point at or before `nominal_end`
    fn sentence_cut(&self, chars: &[char], start: usize, nominal_end: usize) -> usize {
        let floor = nominal_end
            .saturating_sub(self.chunk_size / 2)
            .max(start + 1);

        (floor..=nominal_end)
            .rev()
            .find(|&i| is_sentence_end(chars, i))
            .map(|i| i + 1)
            .unwrap_or(nominal_end)
    }
}

/// `.`, `!` or `?` at `i`, followed by whitespace
fn is_sentence_end(chars: &[char], i: usize) -> bool {
    match (chars.get(i), chars.get(i + 1)) {
        (Some('.' | '!' | '?'), Some(next)) => next.is_whitespace(),
        _ => false,
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}
