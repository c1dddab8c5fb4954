//! Loose content similarity used to guess which upstream file an override
//! was forked from.
//!
//! Results only feed triage, so the threshold is intentionally generous: two
//! blobs are "similar" when their edit distance is below 80% of the longer
//! blob's length once license headers are dropped.

use crate::strip_whitespace;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

const HEADER_OPEN: &str = "/*";
const HEADER_CLOSE: &str = "*/";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub similar: bool,
    pub edit_distance: usize,
    /// Edit distance over the longer blob's length, in `[0, 1]`.
    pub ratio: f64,
}

pub fn compute_similarity(candidate: &str, reference: &str) -> Similarity {
    compute_similarity_with_threshold(candidate, reference, DEFAULT_SIMILARITY_THRESHOLD)
}

pub fn compute_similarity_with_threshold(
    candidate: &str,
    reference: &str,
    threshold: f64,
) -> Similarity {
    let candidate = strip_license_header(candidate);
    let reference = strip_license_header(reference);

    let candidate_chars = candidate.chars().collect::<Vec<_>>();
    let reference_chars = reference.chars().collect::<Vec<_>>();

    let distance = char_edit_distance(&candidate_chars, &reference_chars);
    let longest = candidate_chars.len().max(reference_chars.len());
    let ratio = if longest == 0 {
        0.0
    } else {
        distance as f64 / longest as f64
    };

    Similarity {
        similar: ratio < threshold,
        edit_distance: distance,
        ratio,
    }
}

/// Drop a leading `/* ... */` block (usually a copyright banner). Blobs that
/// do not start with the marker, or never close it, are returned untouched.
pub fn strip_license_header(text: &str) -> &str {
    if !text.starts_with(HEADER_OPEN) {
        return text;
    }

    match text[HEADER_OPEN.len()..].find(HEADER_CLOSE) {
        Some(offset) => &text[HEADER_OPEN.len() + offset + HEADER_CLOSE.len()..],
        None => text,
    }
}

/// Character edit distance between two strings, without header stripping.
pub fn edit_distance(left: &str, right: &str) -> usize {
    let left = left.chars().collect::<Vec<_>>();
    let right = right.chars().collect::<Vec<_>>();
    char_edit_distance(&left, &right)
}

/// Whitespace-insensitive byte equality.
pub fn is_exact_copy(candidate: &str, reference: &str) -> bool {
    strip_whitespace(candidate) == strip_whitespace(reference)
}

// Shared prefix and suffix never change the Levenshtein distance, and
// overrides usually differ from their base in a few places.
fn char_edit_distance(left: &[char], right: &[char]) -> usize {
    let prefix = left
        .iter()
        .zip(right)
        .take_while(|(a, b)| a == b)
        .count();
    let (left, right) = (&left[prefix..], &right[prefix..]);
    let suffix = left
        .iter()
        .rev()
        .zip(right.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let left = &left[..left.len() - suffix];
    let right = &right[..right.len() - suffix];

    if left.is_empty() || right.is_empty() {
        return left.len().max(right.len());
    }

    let left = left.iter().collect::<String>();
    let right = right.iter().collect::<String>();
    strsim::levenshtein(&left, &right)
}
