//! Splitting extracted text into indexed passages.
//!
//! Chunks are windows of `chunk_size` units sharing `overlap` units with the
//! previous window. A unit is a whitespace separated word, except that each
//! CJK ideograph counts as its own unit since those scripts are written
//! without spaces. Chunk content is an exact slice of the source text.

use serde::{Deserialize, Serialize};

/// A passage of extracted text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub chunk_index: u32,
    pub content: String,
    pub token_count: u32,
}

/// Split text into overlapping chunks.
///
/// Returns no chunks for blank text. `overlap` is clamped below `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let units = segment(text);
    if units.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size - overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(units.len());
        let content = &text[units[start].0..units[end - 1].1];

        chunks.push(TextChunk {
            chunk_index: chunks.len() as u32,
            content: content.to_string(),
            token_count: estimate_token_count(content),
        });

        if end == units.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Rough token estimate: one per CJK ideograph, one per four other characters
pub fn estimate_token_count(text: &str) -> u32 {
    let (cjk, other) = text.chars().fold((0u32, 0u32), |(cjk, other), c| {
        if is_cjk(c) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    cjk + other / 4
}

pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Byte ranges of the units in `text`
fn segment(text: &str) -> Vec<(usize, usize)> {
    let mut units = Vec::new();
    let mut word_start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() || is_cjk(c) {
            if let Some(start) = word_start.take() {
                units.push((start, i));
            }
            if is_cjk(c) {
                units.push((i, i + c.len_utf8()));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }

    if let Some(start) = word_start {
        units.push((start, text.len()));
    }

    units
}
