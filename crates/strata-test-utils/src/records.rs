use chrono::{DateTime, Duration, TimeZone, Utc};
use strata_memory::MemoryRecord;

/// Fixed instant used as "now" by tests that need stable timestamps.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn record(key: &str, content: &str, embedding: Vec<f32>) -> MemoryRecord {
    MemoryRecord::new(key, content, embedding, fixed_now())
}

pub fn record_expiring(
    key: &str,
    content: &str,
    embedding: Vec<f32>,
    expires_in: Duration,
) -> MemoryRecord {
    record(key, content, embedding).with_expiry(fixed_now() + expires_in)
}
