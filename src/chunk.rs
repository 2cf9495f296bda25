//! Boundary-aware overlapping text chunker.
//!
//! Splits complaint narratives into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks share exactly `chunk_overlap` characters,
//! so a sentence cut at a chunk edge still appears whole in one of them.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `chunk_size` characters, emit it and stop.
//! 2. Otherwise look for a split point inside the window, preferring (in order)
//!    a paragraph break, a line break, a sentence end, then a space. A split
//!    point is only accepted if it leaves the chunk at least half full.
//! 3. If no boundary qualifies, cut hard at `chunk_size`.
//! 4. The next chunk starts `chunk_overlap` characters before the split.
//!
//! Dropping the first `chunk_overlap` characters of every chunk after the
//! first and concatenating reproduces the input exactly.
//!
//! # Example
//!
//! ```rust
//! use complaint_rag::chunk::Chunker;
//!
//! let chunker = Chunker::new(512, 50).unwrap();
//! let chunks = chunker.split("42", "my credit card was charged twice");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id(), "42_0");
//! ```

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Split points, most preferred first. The separator stays with the
/// chunk on its left.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];

/// Splits text into overlapping, size-bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker. Sizes are in characters.
    ///
    /// # Errors
    ///
    /// [`RagError::Config`] unless `chunk_size > chunk_overlap > 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_size ({}) must be greater than chunk_overlap ({}) and overlap must be > 0",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Iterate over the chunk texts of `text`.
    ///
    /// The iterator is `Clone`, so a consumer can restart from any point.
    /// Empty input yields nothing.
    pub fn windows<'a>(&self, text: &'a str) -> Windows<'a> {
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        Windows {
            text,
            bounds,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            start: 0,
            done: text.is_empty(),
        }
    }

    /// Split a complaint narrative into indexed chunks.
    pub fn split(&self, parent_id: &str, text: &str) -> Vec<Chunk> {
        self.windows(text)
            .enumerate()
            .map(|(index, piece)| Chunk {
                parent_id: parent_id.to_string(),
                index,
                text: piece.to_string(),
            })
            .collect()
    }
}

/// Iterator over chunk slices, see [`Chunker::windows`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()`.
    bounds: Vec<usize>,
    chunk_size: usize,
    chunk_overlap: usize,
    /// Char index where the next chunk starts.
    start: usize,
    done: bool,
}

impl<'a> Windows<'a> {
    fn char_len(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Choose the end (char index, exclusive) of the chunk starting at `start`.
    fn split_point(&self, start: usize, max_end: usize) -> usize {
        let min_end = (start + self.chunk_overlap + 1).max(start + self.chunk_size / 2);
        let base = self.bounds[start];
        let window = &self.text[base..self.bounds[max_end]];

        for sep in SEPARATORS {
            let Some(pos) = window.rfind(sep) else {
                continue;
            };
            let byte = base + pos + sep.len();
            if let Ok(end) = self.bounds.binary_search(&byte) {
                if end >= min_end {
                    return end;
                }
            }
        }

        max_end
    }
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.done {
            return None;
        }

        let start = self.start;
        let max_end = start + self.chunk_size;
        if max_end >= self.char_len() {
            self.done = true;
            return Some(&self.text[self.bounds[start]..]);
        }

        let end = self.split_point(start, max_end);
        self.start = end - self.chunk_overlap;
        Some(&self.text[self.bounds[start]..self.bounds[end]])
    }
}
