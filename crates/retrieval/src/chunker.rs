//! Boundary-aware overlapping text chunker.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `max_size` units, where
//! consecutive chunks share exactly `overlap` units. Sizes are measured in
//! characters, or in tokens via the 4 chars/token heuristic.
//!
//! # Algorithm
//!
//! 1. Work in character-index space so multi-byte text never splits a char.
//! 2. If the rest of the text fits in one window, emit it and stop.
//! 3. Otherwise pick a break `b` inside `(start + overlap, start + max_size]`,
//!    preferring in order: paragraph break (`\n\n`), line break, sentence
//!    end (`. `, `! `, `? `), any whitespace, then a hard cut at the window end.
//!    Breaks land *after* the separator.
//! 4. Emit `[start, b)` and continue from `b - overlap`.
//!
//! Because every break leaves more than `overlap` units in the chunk, each
//! iteration advances by at least one character.

use ragent_config::{ChunkingConfig, SizeUnit};
use ragent_core::document::{Chunk, Document, MetadataValue};
use ragent_core::error::{Error, Result};
use ragent_core::token::CHARS_PER_TOKEN;

/// Unit in which `max_size` and `overlap` are expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkUnit {
    #[default]
    Characters,
    /// Converted to characters at 4 chars per token
    Tokens,
}

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub max_size: usize,
    pub overlap: usize,
    pub unit: ChunkUnit,
}

impl ChunkerConfig {
    /// Build a config, rejecting `max_size == 0` and `overlap >= max_size`.
    pub fn new(max_size: usize, overlap: usize, unit: ChunkUnit) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::config("chunk max_size must be > 0"));
        }
        if overlap >= max_size {
            return Err(Error::config(format!(
                "chunk overlap ({overlap}) must be smaller than max_size ({max_size})"
            )));
        }
        Ok(Self {
            max_size,
            overlap,
            unit,
        })
    }

    pub fn characters(max_size: usize, overlap: usize) -> Result<Self> {
        Self::new(max_size, overlap, ChunkUnit::Characters)
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        let unit = match config.unit {
            SizeUnit::Characters => ChunkUnit::Characters,
            SizeUnit::Tokens => ChunkUnit::Tokens,
        };
        Self::new(config.max_size, config.overlap, unit)
    }

    /// `(max_size, overlap)` in characters.
    fn char_limits(&self) -> (usize, usize) {
        match self.unit {
            ChunkUnit::Characters => (self.max_size, self.overlap),
            ChunkUnit::Tokens => (
                self.max_size * CHARS_PER_TOKEN,
                self.overlap * CHARS_PER_TOKEN,
            ),
        }
    }
}

/// Splits documents according to a fixed [`ChunkerConfig`].
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `document` into chunks. Pure and deterministic.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let (max_chars, overlap_chars) = self.config.char_limits();
        let spans = split_spans(&document.raw_text, max_chars, overlap_chars);

        spans
            .into_iter()
            .enumerate()
            .map(|(index, range)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".into(), MetadataValue::Integer(index as i64));
                metadata.insert(
                    "source_uri".into(),
                    MetadataValue::String(document.source_uri.clone()),
                );
                Chunk {
                    id: Chunk::make_id(&document.id, index),
                    document_id: document.id.clone(),
                    index,
                    text: document.raw_text[range.clone()].to_string(),
                    offset_range: range,
                    metadata,
                }
            })
            .collect()
    }
}

/// Split `document` with character-unit sizes.
pub fn split(document: &Document, max_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let config = ChunkerConfig::characters(max_size, overlap)?;
    Ok(Chunker::new(config).chunk(document))
}

/// Compute byte ranges of each chunk.
fn split_spans(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<std::ops::Range<usize>> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    // byte offset of every char index, plus the end
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        if n - start <= max_chars {
            spans.push(offsets[start]..offsets[n]);
            break;
        }
        let end = find_break(&chars, start + overlap_chars + 1, start + max_chars);
        spans.push(offsets[start]..offsets[end]);
        start = end - overlap_chars;
    }
    spans
}

/// Best break position in `[lo, hi]` (char indices, `lo <= hi`).
fn find_break(chars: &[char], lo: usize, hi: usize) -> usize {
    let is_paragraph = |b: usize| b >= 2 && chars[b - 2] == '\n' && chars[b - 1] == '\n';
    let is_line = |b: usize| chars[b - 1] == '\n';
    let is_sentence =
        |b: usize| b >= 2 && chars[b - 1] == ' ' && matches!(chars[b - 2], '.' | '!' | '?');
    let is_space = |b: usize| chars[b - 1].is_whitespace();

    let preferences: [&dyn Fn(usize) -> bool; 4] = [&is_paragraph, &is_line, &is_sentence, &is_space];
    for accept in preferences {
        if let Some(b) = (lo..=hi).rev().find(|&b| accept(b)) {
            return b;
        }
    }
    hi
}
