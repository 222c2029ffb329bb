//! Builds tiers, manager and evolution engine from a `StrataConfig`.

use chrono::Duration;
use log::info;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use strata_config::{ImprovementStrategyKind, PersistMode, StrataConfig};
use strata_embed::OllamaEmbedder;
use strata_memory::{
    CachedTier, Clock, DurableTier, EmbeddingProvider, EvolutionEngine, EvolutionLog,
    EvolutionSettings, ImprovementStrategy, MemoryError, MemoryManager, MemoryTier,
    PersistTarget, PlaceholderImprovements, RecurringPatternImprovements, SystemClock,
    VolatileTier,
};
use thiserror::Error;

/// Errors raised while assembling a runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Opening a tier or the evolution log failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// The configured embedding provider is not built in.
    #[error("unsupported embedding provider: {0}")]
    UnsupportedProvider(String),
    /// A configured duration does not fit in a timestamp offset.
    #[error("{0} is out of range")]
    DurationOutOfRange(&'static str),
}

/// A fully wired memory stack.
pub struct MemoryRuntime {
    /// Time source shared by every component.
    pub clock: Arc<dyn Clock>,
    /// In-process tier.
    pub volatile: Arc<VolatileTier>,
    /// Per-file tier, present when writes persist to it.
    pub cached: Option<Arc<CachedTier>>,
    /// SQLite tier; always open because evolution runs over it.
    pub durable: Arc<DurableTier>,
    /// Write-through manager over the configured tiers.
    pub manager: MemoryManager,
    /// Consolidation engine over the durable tier.
    pub evolution: EvolutionEngine,
    /// Default number of search results.
    pub default_limit: usize,
}

impl MemoryRuntime {
    /// Build a runtime with the configured embedding provider and the wall clock.
    pub async fn from_config(config: &StrataConfig) -> Result<Self, RuntimeError> {
        let embedding = &config.embedding;
        if embedding.provider != "ollama" {
            return Err(RuntimeError::UnsupportedProvider(embedding.provider.clone()));
        }
        let embedder = OllamaEmbedder::new(&embedding.base_url, &embedding.model, embedding.dimension)
            .with_timeout(StdDuration::from_secs(embedding.timeout_secs));
        info!(
            "using ollama embeddings (base_url={}, model={}, dimension={})",
            embedder.base_url(),
            embedder.model(),
            embedding.dimension
        );
        Self::with_embedder(config, Arc::new(embedder), Arc::new(SystemClock)).await
    }

    /// Build a runtime around an injected embedding provider and clock.
    pub async fn with_embedder(
        config: &StrataConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let storage = &config.storage;
        let target = persist_target(config.manager.persist_to);

        let volatile = Arc::new(VolatileTier::new(clock.clone()));
        let cached = if target.includes_cached() {
            Some(Arc::new(
                CachedTier::open(storage.cached_dir(), clock.clone()).await?,
            ))
        } else {
            None
        };
        let durable = Arc::new(DurableTier::open(storage.durable_path(), clock.clone()).await?);

        let mut tiers: Vec<Arc<dyn MemoryTier>> = vec![volatile.clone()];
        if let Some(cached) = cached.as_ref() {
            tiers.push(cached.clone());
        }
        if target.includes_durable() {
            tiers.push(durable.clone());
        }
        let manager = MemoryManager::new(tiers, embedder.clone(), clock.clone());

        let log = EvolutionLog::open(storage.evolution_path()).await?;
        let evolution = EvolutionEngine::new(durable.clone(), log, embedder, clock.clone())
            .with_settings(evolution_settings(config)?)
            .with_strategy(improvement_strategy(config));

        Ok(Self {
            clock,
            volatile,
            cached,
            durable,
            manager,
            evolution,
            default_limit: config.manager.default_limit,
        })
    }
}

fn persist_target(mode: PersistMode) -> PersistTarget {
    match mode {
        PersistMode::Cached => PersistTarget::Cached,
        PersistMode::Durable => PersistTarget::Durable,
        PersistMode::Both => PersistTarget::Both,
    }
}

fn evolution_settings(config: &StrataConfig) -> Result<EvolutionSettings, RuntimeError> {
    let evolution = &config.evolution;
    let interval = i64::try_from(evolution.interval_hours)
        .ok()
        .and_then(Duration::try_hours)
        .ok_or(RuntimeError::DurationOutOfRange("evolution.interval_hours"))?;
    let improvement_ttl = i64::try_from(evolution.improvement_ttl_days)
        .ok()
        .and_then(Duration::try_days)
        .ok_or(RuntimeError::DurationOutOfRange(
            "evolution.improvement_ttl_days",
        ))?;
    Ok(EvolutionSettings {
        interval,
        neighbor_k: evolution.neighbor_k,
        similarity_threshold: evolution.similarity_threshold,
        improvement_ttl,
    })
}

fn improvement_strategy(config: &StrataConfig) -> Box<dyn ImprovementStrategy> {
    let evolution = &config.evolution;
    match evolution.strategy {
        ImprovementStrategyKind::Placeholder => Box::new(PlaceholderImprovements),
        ImprovementStrategyKind::RecurringPatterns => Box::new(RecurringPatternImprovements {
            min_occurrences: evolution.min_occurrences,
            max_improvements: evolution.max_improvements,
        }),
    }
}
