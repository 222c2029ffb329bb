//! Cosine similarity and the ranking shared by every tier.

use crate::model::MemoryRecord;

/// Cosine similarity between two vectors.
///
/// Vectors of different length score `0` without touching their elements, and
/// so does any pair where either magnitude is zero. Sums are accumulated in
/// `f32`, left to right, so results are reproducible across tiers.
///
/// Components large enough to overflow the `f32` sums (roughly `|x| > 1e19`)
/// also score `0`, so the result is always finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let magnitude = mag_a.sqrt() * mag_b.sqrt();
    if magnitude == 0.0 || !magnitude.is_finite() || !dot.is_finite() {
        return 0.0;
    }
    dot / magnitude
}

/// Highest similarity between `embedding` and any of `records`, floored at 0.
pub fn max_similarity<'a>(
    embedding: &[f32],
    records: impl IntoIterator<Item = &'a MemoryRecord>,
) -> f32 {
    records
        .into_iter()
        .map(|record| cosine_similarity(embedding, &record.embedding))
        .fold(0.0, f32::max)
}

/// Sort descending by similarity, keeping input order for ties.
pub(crate) fn sort_by_score<T>(scored: &mut [(T, f32)]) {
    // Stable sort: equal scores keep their insertion/row order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
}

/// Rank records against a query and keep the best `limit`.
pub(crate) fn rank_records(
    records: impl IntoIterator<Item = MemoryRecord>,
    query: &[f32],
    limit: usize,
) -> Vec<MemoryRecord> {
    if limit == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(MemoryRecord, f32)> = records
        .into_iter()
        .map(|record| {
            let score = cosine_similarity(query, &record.embedding);
            (record, score)
        })
        .collect();
    sort_by_score(&mut scored);
    scored.truncate(limit);
    scored.into_iter().map(|(record, _)| record).collect()
}
