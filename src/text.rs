//! Text normalization for ontology label matching
//!
//! Labels (term names, synonyms, token text) and attribute keys are compared
//! in normalized form:
//! - Unicode NFKC normalization
//! - Lowercase conversion
//! - Whitespace collapsing
//!
//! Label normalization keeps punctuation ("CD4-positive, alpha-beta T cell"
//! is a distinct label from "cd4 positive alpha beta t cell"). Key
//! normalization is looser and folds punctuation to spaces.

use unicode_normalization::UnicodeNormalization;

/// Punctuation trimmed from the edges of a word when building n-grams
const EDGE_PUNCTUATION: &[char] = &[',', ';', ':', '.', '(', ')', '[', ']', '{', '}', '"', '\''];

/// Normalize a label for dictionary lookup.
///
/// ```
/// use biosample_mapper::text::normalize_label;
///
/// assert_eq!(normalize_label("  CD4+   T Cell "), "cd4+ t cell");
/// assert_eq!(normalize_label("Ｔ cell"), "t cell");
/// ```
pub fn normalize_label(s: &str) -> String {
    let folded: String = s.nfkc().collect();
    folded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize an attribute key.
///
/// Replaces every non-alphanumeric character with a space, so that
/// `cell_type`, `Cell-Type` and `cell type` all normalize to `cell type`.
pub fn normalize_key(s: &str) -> String {
    let folded: String = s.nfkc().collect();
    let stripped: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of characters (not bytes) in a string
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Whitespace-delimited words of `s` as byte ranges, with edge punctuation
/// trimmed. Words that are pure punctuation are dropped.
pub fn word_spans(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                push_trimmed(s, start, i, &mut spans);
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }

    // Handle trailing word
    if let Some(start) = word_start {
        push_trimmed(s, start, s.len(), &mut spans);
    }

    spans
}

fn push_trimmed(s: &str, start: usize, end: usize, spans: &mut Vec<(usize, usize)>) {
    let word = &s[start..end];
    let trimmed_front = word.trim_start_matches(EDGE_PUNCTUATION);
    let trimmed = trimmed_front.trim_end_matches(EDGE_PUNCTUATION);
    if trimmed.is_empty() {
        return;
    }
    let new_start = start + (word.len() - trimmed_front.len());
    spans.push((new_start, new_start + trimmed.len()));
}

/// Byte range of `s` with surrounding whitespace removed
pub fn trimmed_range(s: &str) -> (usize, usize) {
    let start = s.len() - s.trim_start().len();
    let end = s.trim_end().len();
    if end < start {
        (start, start)
    } else {
        (start, end)
    }
}
