//! Tiered memory engine for agents.
//!
//! Memories live in three tiers: an in-process [`VolatileTier`], a per-file
//! [`CachedTier`], and the SQLite-backed [`DurableTier`]. The
//! [`MemoryManager`] writes through to every tier and merges similarity
//! search across them; the [`EvolutionEngine`] periodically consolidates the
//! durable tier.

pub mod cached;
pub mod clock;
pub mod durable;
pub mod embedding;
pub mod error;
pub mod evolution;
pub mod manager;
pub mod model;
pub mod similarity;
mod sqlite;
pub mod tier;
pub mod volatile;

/// Disk-backed cache tier.
pub use cached::CachedTier;
/// Time sources.
pub use clock::{Clock, ManualClock, SystemClock};
/// SQLite system-of-record tier.
pub use durable::DurableTier;
/// Embedding provider contract.
pub use embedding::{EmbeddingError, EmbeddingProvider, embed_with_fallback};
/// Memory error type.
pub use error::MemoryError;
/// Evolution engine and audit log.
pub use evolution::{
    EvolutionEngine, EvolutionLog, EvolutionRecord, EvolutionReport, EvolutionSettings,
    EvolutionState, ImprovementStrategy, PlaceholderImprovements, RecurringPatternImprovements,
};
/// Tier orchestration.
pub use manager::{CleanupSummary, MemoryManager, PersistTarget};
/// Records, statistics and scored hits.
pub use model::{MemoryRecord, MemoryStats, ScoredMemory};
/// Cosine similarity.
pub use similarity::cosine_similarity;
/// Tier contract.
pub use tier::MemoryTier;
/// In-process tier.
pub use volatile::VolatileTier;
/// Cancellation token accepted by every async operation.
pub use tokio_util::sync::CancellationToken;
