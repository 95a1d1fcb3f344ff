//! Transcript chunking for embedding generation.
//!
//! Text is split at sentence boundaries and packed into windows of at most
//! `max_chunk_size` bytes. Each window after the first starts with the
//! trailing sentences of the previous one, up to `overlap` bytes, so context
//! carries across chunk edges. The output depends only on the input text and
//! the configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use sift_db::chunking::{Chunker, ChunkerConfig, SentenceWindowChunker};
//!
//! let chunker = SentenceWindowChunker::new(ChunkerConfig::default());
//! for chunk in chunker.chunk("First point. Second point.") {
//!     println!("{}: {}", chunk.index, chunk.text);
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[.!?]+(?:\s+|$)").expect("valid sentence regex")
});

static ABBREVIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:dr|mr|mrs|ms|prof|sr|jr|inc|ltd|co|etc|vs|e\.g|i\.e)\.$")
        .expect("valid abbreviation regex")
});

/// Configuration for chunking.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in bytes.
    pub max_chunk_size: usize,
    /// A trailing chunk smaller than this is folded into its predecessor.
    pub min_chunk_size: usize,
    /// Bytes of trailing sentences repeated at the start of the next chunk.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: sift_core::defaults::CHUNK_SIZE,
            min_chunk_size: sift_core::defaults::CHUNK_MIN_SIZE,
            overlap: sift_core::defaults::CHUNK_OVERLAP,
        }
    }
}

/// A text chunk with its position in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    pub text: String,
    /// Starting byte offset in the original text.
    pub start_offset: usize,
    /// Ending byte offset in the original text.
    pub end_offset: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Common trait for chunking strategies.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    fn config(&self) -> &ChunkerConfig;
}

/// Find UTF-8 safe boundary at or before the given position.
fn find_char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Sentence-aligned sliding window chunker.
#[derive(Debug, Clone)]
pub struct SentenceWindowChunker {
    config: ChunkerConfig,
}

impl SentenceWindowChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Byte ranges of trimmed sentences.
    fn find_sentences(&self, text: &str) -> Vec<(usize, usize)> {
        let mut sentences = Vec::new();
        let mut last_end = 0;

        for mat in SENTENCE_END.find_iter(text) {
            let candidate = &text[last_end..mat.end()];
            if ABBREVIATION.is_match(candidate.trim()) {
                continue;
            }
            push_trimmed(text, last_end, mat.end(), &mut sentences);
            last_end = mat.end();
        }
        if last_end < text.len() {
            push_trimmed(text, last_end, text.len(), &mut sentences);
        }
        sentences
    }

    /// Break sentences longer than the window at whitespace, or at a char boundary.
    fn split_long(&self, text: &str, sentences: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
        let max = self.config.max_chunk_size.max(1);
        let mut out = Vec::with_capacity(sentences.len());
        for (start, end) in sentences {
            let mut offset = start;
            while end - offset > max {
                let hard = find_char_boundary_before(text, offset + max);
                let cut = text[offset..hard]
                    .rfind(char::is_whitespace)
                    .map(|i| offset + i)
                    .filter(|&c| c > offset)
                    .unwrap_or(hard);
                let cut = if cut <= offset {
                    // Single char wider than the window.
                    offset + text[offset..].chars().next().map_or(1, char::len_utf8)
                } else {
                    cut
                };
                push_trimmed(text, offset, cut, &mut out);
                offset = cut;
            }
            push_trimmed(text, offset, end, &mut out);
        }
        out
    }
}

fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if lead + trail < slice.len() {
        out.push((start + lead, end - trail));
    }
}

impl Chunker for SentenceWindowChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let sentences = self.split_long(text, self.find_sentences(text));
        if sentences.is_empty() {
            return Vec::new();
        }

        let max = self.config.max_chunk_size;
        let overlap = self.config.overlap;
        let n = sentences.len();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;

        while i < n {
            let start = sentences[i].0;
            let mut j = i + 1;
            while j < n && sentences[j].1 - start <= max {
                j += 1;
            }
            spans.push((start, sentences[j - 1].1));
            if j >= n {
                break;
            }
            // Step back over trailing sentences that fit in the overlap budget,
            // always leaving at least one new sentence of progress.
            let mut k = j;
            while k > i + 1 && sentences[j - 1].1 - sentences[k - 1].0 <= overlap {
                k -= 1;
            }
            i = k;
        }

        if spans.len() > 1 {
            let (last_start, last_end) = spans[spans.len() - 1];
            if last_end - last_start < self.config.min_chunk_size {
                spans.pop();
                if let Some(prev) = spans.last_mut() {
                    prev.1 = last_end;
                }
            }
        }

        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                index,
                text: text[start..end].to_string(),
                start_offset: start,
                end_offset: end,
            })
            .collect()
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}
