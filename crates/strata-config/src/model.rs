//! Configuration schema for Strata.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root config for a Strata memory runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StrataConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

impl StrataConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> StrataConfigBuilder {
        StrataConfigBuilder::new()
    }
}

/// Builder for assembling a `StrataConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct StrataConfigBuilder {
    config: StrataConfig,
}

impl StrataConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: StrataConfig::default(),
        }
    }

    /// Replace the storage layout.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Point every storage path under `data_dir`.
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.storage = StorageConfig {
            data_dir: data_dir.into(),
            ..StorageConfig::default()
        };
        self
    }

    /// Replace the manager configuration.
    pub fn manager(mut self, manager: ManagerConfig) -> Self {
        self.config.manager = manager;
        self
    }

    /// Replace the embedding client configuration.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Replace the evolution configuration.
    pub fn evolution(mut self, evolution: EvolutionConfig) -> Self {
        self.config.evolution = evolution;
        self
    }

    /// Finalize and return the built `StrataConfig`.
    pub fn build(self) -> StrataConfig {
        self.config
    }
}

/// On-disk layout of the persistent tiers and the evolution log.
///
/// Unset paths resolve under `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub cached_dir: Option<PathBuf>,
    #[serde(default)]
    pub durable_path: Option<PathBuf>,
    #[serde(default)]
    pub evolution_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cached_dir: None,
            durable_path: None,
            evolution_path: None,
        }
    }
}

impl StorageConfig {
    /// Directory holding one JSON file per cached record.
    pub fn cached_dir(&self) -> PathBuf {
        self.cached_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("warm_memory"))
    }

    /// SQLite file of the durable tier.
    pub fn durable_path(&self) -> PathBuf {
        self.durable_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("long_term_memory.db"))
    }

    /// SQLite file of the evolution history.
    pub fn evolution_path(&self) -> PathBuf {
        self.evolution_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("evolution.db"))
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Persistent tiers that receive manager writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    Cached,
    Durable,
    #[default]
    Both,
}

/// Memory manager behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagerConfig {
    #[serde(default)]
    pub persist_to: PersistMode,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            persist_to: PersistMode::default(),
            default_limit: default_limit(),
        }
    }
}

/// Default number of search results.
fn default_limit() -> usize {
    5
}

/// Embedding service connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_base_url(),
            model: default_model(),
            dimension: default_dimension(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

/// Width of the zero-vector fallback and of every returned embedding.
fn default_dimension() -> usize {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

/// Improvement strategy selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementStrategyKind {
    #[default]
    Placeholder,
    RecurringPatterns,
}

/// Evolution cycle tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvolutionConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_neighbor_k")]
    pub neighbor_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_improvement_ttl_days")]
    pub improvement_ttl_days: u64,
    #[serde(default)]
    pub strategy: ImprovementStrategyKind,
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: usize,
    #[serde(default = "default_max_improvements")]
    pub max_improvements: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            neighbor_k: default_neighbor_k(),
            similarity_threshold: default_similarity_threshold(),
            improvement_ttl_days: default_improvement_ttl_days(),
            strategy: ImprovementStrategyKind::default(),
            min_occurrences: default_min_occurrences(),
            max_improvements: default_max_improvements(),
        }
    }
}

/// Three days between cycles.
fn default_interval_hours() -> u64 {
    72
}

fn default_neighbor_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_improvement_ttl_days() -> u64 {
    30
}

fn default_min_occurrences() -> usize {
    2
}

fn default_max_improvements() -> usize {
    5
}
