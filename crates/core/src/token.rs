//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes of UTF-8 per token.
//! This approximation is accurate within ~10% for BPE tokenizers on English
//! text and, more importantly, is deterministic: every budget check in the
//! workspace (memory, composer, chunker in token mode) uses the same count.

/// Approximate bytes-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Keep the end of `text` so that it fits within `max_tokens`.
///
/// Oldest content (the start) is dropped. The cut is snapped forward to the
/// next char boundary, so the result may be slightly shorter than the limit.
pub fn truncate_start(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens * CHARS_PER_TOKEN;
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = text.len() - max_bytes;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    &text[cut..]
}

/// Keep the beginning of `text` so that it fits within `max_tokens`.
///
/// The cut is snapped backward to the previous char boundary.
pub fn truncate_end(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens * CHARS_PER_TOKEN;
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}
