//! Memory manager: write-through to every tier and merged similarity search.

use crate::clock::Clock;
use crate::embedding::{EmbeddingProvider, embed_with_fallback};
use crate::model::{MemoryRecord, ScoredMemory};
use crate::similarity::{cosine_similarity, sort_by_score};
use crate::tier::MemoryTier;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which persistent tiers receive writes besides the volatile tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistTarget {
    /// Cached (per-file) tier only.
    Cached,
    /// Durable (SQLite) tier only.
    Durable,
    /// Both persistent tiers.
    #[default]
    Both,
}

impl PersistTarget {
    /// True when writes reach the cached tier.
    pub fn includes_cached(self) -> bool {
        matches!(self, PersistTarget::Cached | PersistTarget::Both)
    }

    /// True when writes reach the durable tier.
    pub fn includes_durable(self) -> bool {
        matches!(self, PersistTarget::Durable | PersistTarget::Both)
    }
}

/// Outcome of a cleanup pass over every tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Records removed, per tier that succeeded.
    pub removed: Vec<(&'static str, usize)>,
    /// Tiers whose cleanup failed.
    pub failed_tiers: Vec<&'static str>,
}

impl CleanupSummary {
    /// Total records removed across tiers.
    pub fn total_removed(&self) -> usize {
        self.removed.iter().map(|(_, removed)| removed).sum()
    }
}

/// Coordinates the tiers: embeds text once, writes every tier, and merges
/// search results into one global ranking.
///
/// The manager owns no storage of its own.
pub struct MemoryManager {
    tiers: Vec<Arc<dyn MemoryTier>>,
    embedder: Arc<dyn EmbeddingProvider>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.tiers.iter().map(|tier| tier.name()).collect();
        f.debug_struct("MemoryManager")
            .field("tiers", &names)
            .field("dimension", &self.embedder.dimension())
            .finish()
    }
}

impl MemoryManager {
    /// Create a manager over `tiers`; writes and searches visit them in order.
    pub fn new(
        tiers: Vec<Arc<dyn MemoryTier>>,
        embedder: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "initialized memory manager (tiers={})",
            tiers
                .iter()
                .map(|tier| tier.name())
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            tiers,
            embedder,
            clock,
        }
    }

    /// Names of the managed tiers, in write order.
    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Embed and store `content` under `key` in every tier; never expires.
    ///
    /// Returns `false` if any tier rejected the write. Failures are logged,
    /// never propagated.
    pub async fn store_memory(&self, key: &str, content: &str, cancel: &CancellationToken) -> bool {
        self.store(key, content, None, cancel).await
    }

    /// Like [`MemoryManager::store_memory`], expiring `ttl` after now.
    pub async fn store_memory_with_ttl(
        &self,
        key: &str,
        content: &str,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        self.store(key, content, Some(ttl), cancel).await
    }

    async fn store(
        &self,
        key: &str,
        content: &str,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> bool {
        let embedding = match embed_with_fallback(self.embedder.as_ref(), content, cancel).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("store memory aborted (key={key}): {err}");
                return false;
            }
        };
        let now = self.clock.now();
        let mut record = MemoryRecord::new(key, content, embedding, now);
        if let Some(ttl) = ttl {
            record = record.with_expiry(now + ttl);
        }
        if let Err(err) = record.validate() {
            warn!("store memory rejected: {err}");
            return false;
        }

        let writes = self.tiers.iter().map(|tier| {
            let record = record.clone();
            async move { (tier.name(), tier.store(record, cancel).await) }
        });
        let mut stored = true;
        for (tier, result) in join_all(writes).await {
            if let Err(err) = result {
                warn!("store memory failed (tier={tier}, key={key}): {err}");
                stored = false;
            }
        }
        debug!(
            "stored memory (key={key}, content_len={}, ok={stored})",
            content.len()
        );
        stored
    }

    /// Up to `limit` memories most similar to `query`, across every tier.
    ///
    /// The query is embedded once and every tier is searched concurrently.
    /// The same logical write seen through several tiers (same key and
    /// `created_at`) is kept once, from the first tier that returned it. A
    /// failing tier contributes nothing.
    pub async fn search_similar(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Vec<ScoredMemory> {
        if limit == 0 {
            return Vec::new();
        }
        let embedding = match embed_with_fallback(self.embedder.as_ref(), query, cancel).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!("search memory aborted: {err}");
                return Vec::new();
            }
        };

        let searches = self.tiers.iter().map(|tier| {
            let embedding = &embedding;
            async move {
                (
                    tier.name(),
                    tier.search_similar(embedding, limit, cancel).await,
                )
            }
        });
        let results = join_all(searches).await;

        let mut seen: HashSet<(String, DateTime<Utc>)> = HashSet::new();
        let mut merged: Vec<((MemoryRecord, &'static str), f32)> = Vec::new();
        for (tier, result) in results {
            match result {
                Ok(records) => {
                    for record in records {
                        if !seen.insert((record.key.clone(), record.created_at)) {
                            continue;
                        }
                        let score = cosine_similarity(&embedding, &record.embedding);
                        merged.push(((record, tier), score));
                    }
                }
                Err(err) => warn!("search tier failed (tier={tier}): {err}"),
            }
        }
        sort_by_score(&mut merged);
        merged.truncate(limit);
        debug!(
            "searched memory (query_len={}, limit={limit}, returned={})",
            query.len(),
            merged.len()
        );
        merged
            .into_iter()
            .map(|((record, tier), similarity)| ScoredMemory {
                record,
                similarity,
                tier,
            })
            .collect()
    }

    /// Remove expired records from every tier.
    pub async fn cleanup(&self, cancel: &CancellationToken) -> CleanupSummary {
        let sweeps = self
            .tiers
            .iter()
            .map(|tier| async move { (tier.name(), tier.cleanup(cancel).await) });
        let mut summary = CleanupSummary::default();
        for (tier, result) in join_all(sweeps).await {
            match result {
                Ok(removed) => summary.removed.push((tier, removed)),
                Err(err) => {
                    warn!("cleanup tier failed (tier={tier}): {err}");
                    summary.failed_tiers.push(tier);
                }
            }
        }
        info!(
            "cleaned memory tiers (removed={}, failed={})",
            summary.total_removed(),
            summary.failed_tiers.len()
        );
        summary
    }
}
