//! Evolution engine: periodic consolidation of the durable tier.
//!
//! A cycle runs five phases in order:
//! 1. analyze shared-word patterns between each memory and its neighbors,
//! 2. turn those patterns into improvements via an [`ImprovementStrategy`],
//! 3. batch similar memories into summaries, then clean expired rows,
//! 4. append an audit record to the [`EvolutionLog`],
//! 5. store each improvement back into the durable tier with a TTL.
//!
//! Nothing is scheduled internally; callers poll [`EvolutionEngine::should_evolve`].

mod batching;
mod history;
mod improvements;
mod patterns;

pub use batching::{SUMMARY_SEPARATOR, summarize_batches};
pub use history::{EvolutionLog, EvolutionRecord};
pub use improvements::{
    ImprovementStrategy, NO_IMPROVEMENTS, PlaceholderImprovements, RecurringPatternImprovements,
};
pub use patterns::{PatternCounts, extract_pattern};

use crate::clock::Clock;
use crate::durable::DurableTier;
use crate::embedding::{EmbeddingProvider, embed_with_fallback};
use crate::error::MemoryError;
use crate::model::{MemoryRecord, MemoryStats};
use crate::tier::{MemoryTier, ensure_active};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use patterns::record_patterns;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Whether a cycle is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionState {
    /// No cycle in progress.
    Idle,
    /// A cycle is running.
    Evolving,
}

/// Tunables for the evolution cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvolutionSettings {
    /// Minimum time between cycles.
    pub interval: Duration,
    /// Neighbors fetched per memory during analysis.
    pub neighbor_k: usize,
    /// Similarity a memory must exceed to join the open batch.
    pub similarity_threshold: f32,
    /// Lifetime of stored improvement memories.
    pub improvement_ttl: Duration,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            interval: Duration::days(3),
            neighbor_k: 5,
            similarity_threshold: 0.8,
            improvement_ttl: Duration::days(30),
        }
    }
}

/// What one cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionReport {
    /// Audit log row id.
    pub record_id: i64,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Pattern counts from analysis.
    pub patterns: PatternCounts,
    /// Generated improvements.
    pub improvements: Vec<String>,
    /// Batch summaries.
    pub summaries: Vec<String>,
    /// Expired rows removed during the cycle.
    pub removed: usize,
    /// Durable tier statistics recorded in the audit log.
    pub stats: MemoryStats,
    /// Keys of the stored improvement memories.
    pub applied_keys: Vec<String>,
}

/// Runs evolution cycles over a durable tier.
pub struct EvolutionEngine {
    durable: Arc<DurableTier>,
    log: EvolutionLog,
    embedder: Arc<dyn EmbeddingProvider>,
    clock: Arc<dyn Clock>,
    strategy: Box<dyn ImprovementStrategy>,
    settings: EvolutionSettings,
    state: Mutex<EvolutionState>,
}

impl fmt::Debug for EvolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolutionEngine")
            .field("durable", &self.durable.path())
            .field("log", &self.log.path())
            .field("strategy", &self.strategy.name())
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

/// Resets the engine to `Idle` however the cycle ends.
struct EvolvingGuard<'a> {
    state: &'a Mutex<EvolutionState>,
}

impl Drop for EvolvingGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = EvolutionState::Idle;
    }
}

fn phase_error(phase: &'static str) -> impl FnOnce(MemoryError) -> MemoryError {
    move |source| MemoryError::EvolutionPhase {
        phase,
        source: Box::new(source),
    }
}

impl EvolutionEngine {
    /// Create an engine with default settings and the placeholder strategy.
    pub fn new(
        durable: Arc<DurableTier>,
        log: EvolutionLog,
        embedder: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            durable,
            log,
            embedder,
            clock,
            strategy: Box::new(PlaceholderImprovements),
            settings: EvolutionSettings::default(),
            state: Mutex::new(EvolutionState::Idle),
        }
    }

    /// Replace the cycle settings.
    pub fn with_settings(mut self, settings: EvolutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the improvement strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn ImprovementStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> &EvolutionSettings {
        &self.settings
    }

    /// Audit log handle.
    pub fn log(&self) -> &EvolutionLog {
        &self.log
    }

    /// Current state.
    pub fn state(&self) -> EvolutionState {
        *self.state.lock()
    }

    /// True when no cycle has ever run or the last one is at least one
    /// interval old.
    pub async fn should_evolve(&self, cancel: &CancellationToken) -> Result<bool, MemoryError> {
        let Some(last) = self.log.last_timestamp(cancel).await? else {
            return Ok(true);
        };
        Ok(self.clock.now() - last >= self.settings.interval)
    }

    /// Run one full cycle.
    ///
    /// Fails with [`MemoryError::EvolutionInProgress`] if a cycle is already
    /// running. A failing phase aborts the rest; no audit record is written
    /// unless analysis, improvement generation and summarization succeeded.
    pub async fn evolve(&self, cancel: &CancellationToken) -> Result<EvolutionReport, MemoryError> {
        let _guard = self.begin()?;
        info!("starting evolution (strategy={})", self.strategy.name());

        let memories = self
            .analysis_snapshot(cancel)
            .await
            .map_err(phase_error("analyze"))?;
        let patterns = self
            .analyze(&memories, cancel)
            .await
            .map_err(phase_error("analyze"))?;
        debug!("analyzed memory patterns (patterns={})", patterns.len());

        let improvements = self.strategy.generate(&patterns);
        debug!("generated improvements (count={})", improvements.len());
        ensure_active(cancel).map_err(phase_error("improve"))?;

        let summaries = summarize_batches(&memories, self.settings.similarity_threshold);
        let removed = self
            .durable
            .cleanup(cancel)
            .await
            .map_err(phase_error("summarize"))?;
        debug!(
            "summarized memories (batches={}, removed={removed})",
            summaries.len()
        );

        let timestamp = self.clock.now();
        let stats = self
            .durable
            .get_stats(cancel)
            .await
            .map_err(phase_error("record"))?;
        let record_id = self
            .log
            .append(timestamp, &summaries, &improvements, &stats, cancel)
            .await
            .map_err(phase_error("record"))?;

        let applied_keys = self
            .apply(&improvements, timestamp, cancel)
            .await
            .map_err(phase_error("apply"))?;

        info!(
            "completed evolution (record_id={record_id}, patterns={}, summaries={}, improvements={})",
            patterns.len(),
            summaries.len(),
            applied_keys.len()
        );
        Ok(EvolutionReport {
            record_id,
            timestamp,
            patterns,
            improvements,
            summaries,
            removed,
            stats,
            applied_keys,
        })
    }

    fn begin(&self) -> Result<EvolvingGuard<'_>, MemoryError> {
        let mut state = self.state.lock();
        if *state == EvolutionState::Evolving {
            return Err(MemoryError::EvolutionInProgress);
        }
        *state = EvolutionState::Evolving;
        Ok(EvolvingGuard { state: &self.state })
    }

    /// Every durable record in row order, with empty embeddings recomputed.
    async fn analysis_snapshot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut memories = self.durable.get_all(cancel).await?;
        for memory in memories.iter_mut().filter(|memory| memory.embedding.is_empty()) {
            memory.embedding =
                embed_with_fallback(self.embedder.as_ref(), &memory.content, cancel).await?;
        }
        Ok(memories)
    }

    async fn analyze(
        &self,
        memories: &[MemoryRecord],
        cancel: &CancellationToken,
    ) -> Result<PatternCounts, MemoryError> {
        let mut patterns = PatternCounts::new();
        for memory in memories {
            let neighbors = self
                .durable
                .search_similar(&memory.embedding, self.settings.neighbor_k, cancel)
                .await?;
            record_patterns(
                &mut patterns,
                &memory.content,
                neighbors.iter().map(|neighbor| neighbor.content.as_str()),
            );
        }
        Ok(patterns)
    }

    async fn apply(
        &self,
        improvements: &[String],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, MemoryError> {
        let stamp = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros());
        let mut keys = Vec::with_capacity(improvements.len());
        for (index, improvement) in improvements.iter().enumerate() {
            let content = format!("Applied improvement: {improvement}");
            let embedding = embed_with_fallback(self.embedder.as_ref(), &content, cancel).await?;
            let key = format!("evolution_{stamp}_{index}");
            let record = MemoryRecord::new(key.clone(), content, embedding, now)
                .with_expiry(now + self.settings.improvement_ttl);
            self.durable.store(record, cancel).await?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EvolutionEngine, EvolutionLog, EvolutionSettings, EvolutionState, NO_IMPROVEMENTS,
        RecurringPatternImprovements,
    };
    use crate::clock::{Clock, ManualClock};
    use crate::durable::DurableTier;
    use crate::embedding::{EmbeddingError, EmbeddingProvider};
    use crate::error::MemoryError;
    use crate::model::MemoryRecord;
    use crate::tier::MemoryTier;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};
    use tokio_util::sync::CancellationToken;

    /// Embeds by the first word: "alpha" and "beta" point in different directions.
    struct FirstWord;

    #[async_trait]
    impl EmbeddingProvider for FirstWord {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            match text.split_whitespace().next() {
                Some("alpha") => Ok(vec![1.0, 0.0]),
                Some("beta") => Ok(vec![0.0, 1.0]),
                _ => Err(EmbeddingError::Request("unknown".to_string())),
            }
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct Fixture {
        _temp: TempDir,
        clock: Arc<ManualClock>,
        durable: Arc<DurableTier>,
        engine: EvolutionEngine,
    }

    async fn fixture() -> Fixture {
        let temp = tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
        ));
        let durable = Arc::new(
            DurableTier::open(temp.path().join("long.db"), clock.clone())
                .await
                .expect("durable"),
        );
        let log = EvolutionLog::open(temp.path().join("evolution.db"))
            .await
            .expect("log");
        let engine = EvolutionEngine::new(durable.clone(), log, Arc::new(FirstWord), clock.clone());
        Fixture {
            _temp: temp,
            clock,
            durable,
            engine,
        }
    }

    async fn seed(fixture: &Fixture, key: &str, content: &str, embedding: Vec<f32>) {
        fixture
            .durable
            .store(
                MemoryRecord::new(key, content, embedding, fixture.clock.now()),
                &CancellationToken::new(),
            )
            .await
            .expect("seed");
    }

    #[tokio::test]
    async fn should_evolve_follows_the_interval() {
        let fixture = fixture().await;
        let cancel = CancellationToken::new();
        assert!(fixture.engine.should_evolve(&cancel).await.expect("check"));

        fixture.engine.evolve(&cancel).await.expect("evolve");
        assert!(!fixture.engine.should_evolve(&cancel).await.expect("check"));

        fixture.clock.advance(Duration::days(3) - Duration::seconds(1));
        assert!(!fixture.engine.should_evolve(&cancel).await.expect("check"));
        fixture.clock.advance(Duration::seconds(1));
        assert!(fixture.engine.should_evolve(&cancel).await.expect("check"));
        assert_eq!(fixture.engine.state(), EvolutionState::Idle);
    }

    #[tokio::test]
    async fn cycle_batches_records_and_applies_placeholder() {
        let fixture = fixture().await;
        let cancel = CancellationToken::new();
        seed(&fixture, "a", "alpha one", vec![1.0, 0.0]).await;
        seed(&fixture, "b", "alpha two", vec![0.99, 0.141]).await;
        seed(&fixture, "c", "beta three", vec![0.0, 1.0]).await;

        let report = fixture.engine.evolve(&cancel).await.expect("evolve");
        assert_eq!(
            report.summaries,
            vec!["alpha one | alpha two".to_string(), "beta three".to_string()]
        );
        assert_eq!(report.improvements, vec![NO_IMPROVEMENTS.to_string()]);
        assert_eq!(report.patterns.get("alpha"), Some(&2));
        assert_eq!(report.stats.total_memories, 3);
        assert_eq!(report.applied_keys.len(), 1);
        assert!(report.applied_keys[0].starts_with("evolution_"));
        assert!(report.applied_keys[0].ends_with("_0"));

        let applied = fixture
            .durable
            .get(&report.applied_keys[0], &cancel)
            .await
            .expect("get")
            .expect("improvement stored");
        assert_eq!(
            applied.content,
            format!("Applied improvement: {NO_IMPROVEMENTS}")
        );
        assert_eq!(
            applied.expires_at,
            Some(fixture.clock.now() + Duration::days(30))
        );

        let history = fixture
            .engine
            .log()
            .history(5, &cancel)
            .await
            .expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, report.record_id);
        assert_eq!(history[0].summary, report.summaries);
    }

    #[tokio::test]
    async fn empty_embeddings_are_recomputed_for_analysis() {
        let fixture = fixture().await;
        let cancel = CancellationToken::new();
        seed(&fixture, "a", "alpha first", vec![]).await;
        seed(&fixture, "b", "alpha second", vec![]).await;

        let report = fixture.engine.evolve(&cancel).await.expect("evolve");
        assert_eq!(
            report.summaries,
            vec!["alpha first | alpha second".to_string()]
        );
    }

    #[tokio::test]
    async fn cycle_removes_expired_and_uses_strategy() {
        let fixture = fixture().await;
        let cancel = CancellationToken::new();
        let now = fixture.clock.now();
        fixture
            .durable
            .store(
                MemoryRecord::new("old", "beta old", vec![0.0, 1.0], now - Duration::days(2))
                    .with_expiry(now - Duration::days(1)),
                &cancel,
            )
            .await
            .expect("store");
        seed(&fixture, "a", "alpha shared words", vec![1.0, 0.0]).await;
        seed(&fixture, "b", "alpha shared words", vec![1.0, 0.0]).await;

        let engine = fixture
            .engine
            .with_strategy(Box::new(RecurringPatternImprovements {
                min_occurrences: 2,
                max_improvements: 3,
            }))
            .with_settings(EvolutionSettings {
                improvement_ttl: Duration::days(7),
                ..EvolutionSettings::default()
            });
        let report = engine.evolve(&cancel).await.expect("evolve");
        assert_eq!(report.removed, 1);
        assert_eq!(report.stats.total_memories, 2);
        assert_eq!(report.patterns.get("alpha shared words"), Some(&4));
        assert_eq!(
            report.improvements,
            vec!["Consolidate recurring pattern \"alpha shared words\" (seen 4 times)".to_string()]
        );
        assert_eq!(report.applied_keys.len(), 1);
    }

    #[tokio::test]
    async fn second_concurrent_cycle_is_rejected() {
        let fixture = fixture().await;
        let guard = fixture.engine.begin().expect("begin");
        assert_eq!(fixture.engine.state(), EvolutionState::Evolving);
        let err = fixture
            .engine
            .evolve(&CancellationToken::new())
            .await
            .expect_err("in progress");
        assert!(matches!(err, MemoryError::EvolutionInProgress));
        drop(guard);
        assert_eq!(fixture.engine.state(), EvolutionState::Idle);
    }

    #[tokio::test]
    async fn cancelled_cycle_writes_no_audit_record() {
        let fixture = fixture().await;
        seed(&fixture, "a", "alpha", vec![1.0, 0.0]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fixture.engine.evolve(&cancel).await.expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(fixture.engine.state(), EvolutionState::Idle);

        let fresh = CancellationToken::new();
        assert!(fixture.engine.log().history(5, &fresh).await.expect("history").is_empty());
        assert!(fixture.engine.should_evolve(&fresh).await.expect("check"));
    }
}
