//! Character- and token-level text signals.
//!
//! These heuristics run next to the model scores and catch degenerate input
//! the models handle poorly: single-token flooding, symbol/caps bursts, and
//! homoglyph-style script mixing inside individual tokens.

use std::collections::HashMap;

use sift_types::VerdictSignals;

use crate::config::SignalThresholds;

/// Share of the message taken by its most frequent token, in `0.0..=1.0`.
pub fn repetition_ratio(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    let highest = counts.values().copied().max().unwrap_or(0);
    highest as f64 / tokens.len() as f64
}

/// Single anomaly score in `0.0..=1.0` from character-level irregularities.
/// Punctuation, caps, and symbol ratios plus repeated-character runs and
/// control characters, equally weighted.
pub fn anomaly_score(text: &str) -> f64 {
    let length = text.chars().count().max(1) as f64;

    let punctuation_ratio =
        text.chars().filter(|c| matches!(c, '!' | '?' | '.')).count() as f64 / length;
    let caps_ratio = text.chars().filter(|c| c.is_uppercase()).count() as f64 / length;
    let symbol_ratio = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count() as f64
        / length;
    let repeat_chars = if has_repeated_run(text, 4) { 1.0 } else { 0.0 };
    let non_printable = if text.chars().any(char::is_control) {
        1.0
    } else {
        0.0
    };

    let score = 0.2 * punctuation_ratio
        + 0.2 * caps_ratio
        + 0.2 * symbol_ratio
        + 0.2 * repeat_chars
        + 0.2 * non_printable;
    score.min(1.0)
}

/// Whether the text contains a run of `run_length` or more identical
/// characters.
fn has_repeated_run(text: &str, run_length: usize) -> bool {
    let mut previous: Option<char> = None;
    let mut run = 0usize;
    for c in text.chars() {
        if previous == Some(c) {
            run += 1;
        } else {
            previous = Some(c);
            run = 1;
        }
        if run >= run_length {
            return true;
        }
    }
    false
}

/// Script family of one character, for mixed-script detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Script {
    Latin,
    Cyrillic,
    Other,
}

fn script_of(c: char) -> Script {
    if c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c) {
        Script::Latin
    } else if ('\u{0400}'..='\u{04FF}').contains(&c) {
        Script::Cyrillic
    } else {
        Script::Other
    }
}

/// Ratio of tokens whose alphabetic characters span more than one script,
/// in `0.0..=1.0`.
pub fn mixed_script_ratio(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let mixed = tokens
        .iter()
        .filter(|token| {
            let mut scripts = std::collections::HashSet::new();
            for c in token.chars().filter(|c| c.is_alphabetic()) {
                scripts.insert(script_of(c));
            }
            scripts.len() > 1
        })
        .count();
    mixed as f64 / tokens.len() as f64
}

/// Evaluate all signals for one message. Repetition only applies to
/// messages long enough for a dominant-token ratio to mean anything.
pub fn evaluate(text: &str, thresholds: &SignalThresholds) -> VerdictSignals {
    let token_count = text.split_whitespace().count();
    VerdictSignals {
        repetitive: token_count >= thresholds.repetition_min_tokens
            && repetition_ratio(text) > thresholds.repetition_ratio,
        anomaly_score: anomaly_score(text),
        mixed_script_ratio: mixed_script_ratio(text),
    }
}
