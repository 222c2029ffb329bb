//! Shared-word patterns between a memory and its neighbors.

use std::collections::{BTreeMap, HashSet};

/// Pattern text mapped to the number of (anchor, neighbor) pairs producing it.
pub type PatternCounts = BTreeMap<String, usize>;

/// Words of `anchor` that also appear in `neighbor`, ignoring case.
///
/// Each word is kept once, in its first-occurrence order and casing within
/// `anchor`; the result is joined with single spaces. No shared word yields an
/// empty string.
pub fn extract_pattern(anchor: &str, neighbor: &str) -> String {
    let neighbor_words: HashSet<String> = neighbor
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let mut emitted = HashSet::new();
    let mut shared = Vec::new();
    for word in anchor.split_whitespace() {
        let folded = word.to_lowercase();
        if neighbor_words.contains(&folded) && emitted.insert(folded) {
            shared.push(word);
        }
    }
    shared.join(" ")
}

/// Count the non-empty pattern of `anchor` against each neighbor.
pub(crate) fn record_patterns<'a>(
    counts: &mut PatternCounts,
    anchor: &str,
    neighbors: impl IntoIterator<Item = &'a str>,
) {
    for neighbor in neighbors {
        let pattern = extract_pattern(anchor, neighbor);
        if !pattern.is_empty() {
            *counts.entry(pattern).or_insert(0) += 1;
        }
    }
}
