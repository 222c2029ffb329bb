//! Error types for memory operations.

/// Errors returned by memory tiers, the manager, and the evolution engine.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// SQLite error from the durable tier or the evolution log.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Record key is empty or unusable for the target tier.
    #[error("invalid memory key: {0:?}")]
    InvalidKey(String),
    /// Stored data could not be decoded.
    #[error("corrupt memory data: {0}")]
    Corrupt(String),
    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,
    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    Join(String),
    /// An evolution cycle is already running.
    #[error("evolution already in progress")]
    EvolutionInProgress,
    /// An evolution phase failed; the cycle was aborted.
    #[error("evolution phase `{phase}` failed: {source}")]
    EvolutionPhase {
        phase: &'static str,
        #[source]
        source: Box<MemoryError>,
    },
}

impl MemoryError {
    /// True when the error is a cancellation rather than a storage failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            MemoryError::Cancelled => true,
            MemoryError::EvolutionPhase { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::Join(err.to_string())
    }
}
