//! Helpers for working with SQL source text by byte range.

use std::ops::Range;

/// Byte range of `fragment` within `source`, when `fragment` is a subslice of it.
pub fn span_within(source: &str, fragment: &str) -> Option<Range<usize>> {
    let start = (fragment.as_ptr() as usize).checked_sub(source.as_ptr() as usize)?;
    let end = start + fragment.len();
    (end <= source.len()).then_some(start..end)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Canonical spelling of a SQL fragment used for equality checks.
///
/// Outside quoted text, ASCII letters are lower-cased and whitespace is dropped
/// unless it separates two word characters, where it becomes one space.
/// Quoted identifiers and string literals are kept byte for byte.
pub fn normalize_fragment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in text.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && out.chars().last().is_some_and(is_word_char) && is_word_char(c) {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' || c == '"' {
            quote = Some(c);
            out.push(c);
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}
