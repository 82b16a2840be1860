//! Deterministic text utilities shared by the chunker, ranker and synthesizer

use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("Failed to compile word regex"))
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("Failed to compile year regex"))
}

/// Collapse whitespace runs to a single space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    whitespace_regex().replace_all(text, " ").trim().to_string()
}

/// Sentence byte ranges within already-normalized `text`.
///
/// A sentence ends at `.`, `!` or `?` followed by a space; the separating
/// space belongs to neither neighbour. Text without terminal punctuation is
/// one sentence.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut previous: Option<char> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() && matches!(previous, Some('.' | '!' | '?')) {
            if idx > start {
                spans.push(start..idx);
            }
            start = idx + ch.len_utf8();
        }
        previous = Some(ch);
    }
    if start < text.len() && !text[start..].trim().is_empty() {
        spans.push(start..text.len());
    }
    spans
}

/// Split free text into normalized sentences
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    sentence_spans(&normalized)
        .into_iter()
        .map(|span| normalized[span].to_string())
        .collect()
}

/// Lowercased word tokens used for lexical scoring
pub fn tokenize(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Distinct query terms, minus very short tokens that carry no signal
pub fn query_terms(query: &str) -> HashSet<String> {
    tokenize(query)
        .into_iter()
        .filter(|t| t.chars().count() > 2)
        .collect()
}

/// First plausible publication year (1900-2099) in a date string
pub fn parse_year(date: &str) -> Option<i32> {
    year_regex()
        .find(date)
        .and_then(|m| m.as_str().parse().ok())
}

/// Largest char boundary in `text` that is `<= index`
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut idx = index;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
