//! Greedy similarity batching used to summarize the durable tier.

use crate::model::MemoryRecord;
use crate::similarity::max_similarity;

/// Separator between member contents in a batch summary.
pub const SUMMARY_SEPARATOR: &str = " | ";

/// Group `records` in order into runs of similar memories and summarize each.
///
/// A record joins the open batch when its best similarity against any member
/// exceeds `threshold`; otherwise the batch closes and the record opens the
/// next one. Each summary is the members' contents joined by
/// [`SUMMARY_SEPARATOR`].
pub fn summarize_batches(records: &[MemoryRecord], threshold: f32) -> Vec<String> {
    let mut summaries = Vec::new();
    let mut batch: Vec<&MemoryRecord> = Vec::new();
    for record in records {
        if !batch.is_empty()
            && max_similarity(&record.embedding, batch.iter().copied()) <= threshold
        {
            summaries.push(summarize(&batch));
            batch.clear();
        }
        batch.push(record);
    }
    if !batch.is_empty() {
        summaries.push(summarize(&batch));
    }
    summaries
}

fn summarize(batch: &[&MemoryRecord]) -> String {
    batch
        .iter()
        .map(|record| record.content.as_str())
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}
