//! In-process volatile tier.

use crate::clock::Clock;
use crate::error::MemoryError;
use crate::model::MemoryRecord;
use crate::similarity::rank_records;
use crate::tier::{MemoryTier, ensure_active};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Slot {
    seq: u64,
    record: MemoryRecord,
}

/// Thread-safe key → record map with no persistence.
#[derive(Debug)]
pub struct VolatileTier {
    records: RwLock<HashMap<String, Slot>>,
    next_seq: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl VolatileTier {
    /// Create an empty tier.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            clock,
        }
    }

    /// Insert or replace a record.
    pub fn put(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        record.validate()?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            "stored volatile memory (key={}, content_len={})",
            record.key,
            record.content.len()
        );
        self.records
            .write()
            .insert(record.key.clone(), Slot { seq, record });
        Ok(())
    }

    /// Non-expired records ranked by similarity; ties keep insertion order.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<MemoryRecord> {
        let now = self.clock.now();
        let mut candidates: Vec<(u64, MemoryRecord)> = self
            .records
            .read()
            .values()
            .filter(|slot| !slot.record.is_expired(now))
            .map(|slot| (slot.seq, slot.record.clone()))
            .collect();
        candidates.sort_by_key(|(seq, _)| *seq);
        rank_records(
            candidates.into_iter().map(|(_, record)| record),
            query,
            limit,
        )
    }

    /// Drop every expired record.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, slot| !slot.record.is_expired(now));
        let removed = before - records.len();
        if removed > 0 {
            debug!("purged volatile memories (removed={removed})");
        }
        removed
    }

    /// Record under `key`, expired or not.
    pub fn get(&self, key: &str) -> Option<MemoryRecord> {
        self.records.read().get(key).map(|slot| slot.record.clone())
    }

    /// Number of held records, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MemoryTier for VolatileTier {
    fn name(&self) -> &'static str {
        "volatile"
    }

    async fn store(
        &self,
        record: MemoryRecord,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        ensure_active(cancel)?;
        self.put(record)
    }

    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        ensure_active(cancel)?;
        Ok(self.search(query, limit))
    }

    async fn cleanup(&self, cancel: &CancellationToken) -> Result<usize, MemoryError> {
        ensure_active(cancel)?;
        Ok(self.purge_expired())
    }
}
