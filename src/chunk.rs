//! Overlapping line-window chunker.
//!
//! Splits file text into [`Chunk`]s of at most `max_lines` lines, where each
//! chunk after the first starts `overlap` lines before the previous one ended.
//! The last chunk always ends on the last line of the file.
//!
//! Chunk ids are taken from a caller-supplied counter so that ids stay
//! sequential across all files of one indexing run.

use crate::error::ConfigError;
use crate::models::{Chunk, ChunkId};

/// Validated window parameters. `overlap < max_lines` always holds, which
/// guarantees the cursor moves forward on every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_lines: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(max_lines: usize, overlap: usize) -> Result<Self, ConfigError> {
        if max_lines == 0 {
            return Err(ConfigError::ZeroMaxLines);
        }
        if overlap >= max_lines {
            return Err(ConfigError::OverlapTooLarge { overlap, max_lines });
        }
        Ok(Self { max_lines, overlap })
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Split `text` into line-window chunks, numbering them from `first_id`.
///
/// An empty text produces no chunks.
pub fn chunk_lines(
    text: &str,
    path: &str,
    language: &str,
    first_id: ChunkId,
    params: ChunkParams,
) -> Vec<Chunk> {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    let mut chunks = Vec::new();
    let mut chunk_id = first_id;
    let mut i = 0usize;

    while i < total {
        let end = (i + params.max_lines).min(total);
        chunks.push(Chunk {
            chunk_id,
            path: path.to_string(),
            language: language.to_string(),
            start_line: i + 1,
            end_line: end,
            text: lines[i..end].join("\n"),
        });
        chunk_id += 1;

        if end >= total {
            break;
        }
        i = end.saturating_sub(params.overlap);
    }

    chunks
}
