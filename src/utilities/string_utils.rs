//! String utility functions shared by retrieval, embedding and affect lookup.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Split text into lower-case alphanumeric words, in order.
///
/// `"High-LogP fixatives (dry skin)"` → `["high", "logp", "fixatives", "dry", "skin"]`
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Distinct lower-case words of `text`.
pub fn word_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Normalize a catalog key: trimmed, lower-case, inner whitespace collapsed.
pub fn normalize_key(name: &str) -> String {
    WHITESPACE
        .replace_all(name.trim(), " ")
        .to_lowercase()
}
