//! Embedding provider contract and the zero-vector fallback.

use crate::error::MemoryError;
use async_trait::async_trait;
use log::warn;
use tokio_util::sync::CancellationToken;

/// Errors reported by embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// Transport or HTTP failure.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The provider answered with something unusable.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    /// The returned vector does not match the provider's dimensionality.
    #[error("embedding dimension mismatch (expected={expected}, actual={actual})")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[async_trait]
/// Maps text to a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Embed `text`, substituting a zero vector of the provider's dimension when
/// the provider fails. Only cancellation is reported as an error.
pub async fn embed_with_fallback(
    provider: &dyn EmbeddingProvider,
    text: &str,
    cancel: &CancellationToken,
) -> Result<Vec<f32>, MemoryError> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
        result = provider.embed(text) => result,
    };
    match result {
        Ok(embedding) => Ok(embedding),
        Err(err) => {
            warn!(
                "embedding failed, using zero vector (dimension={}, text_len={}): {err}",
                provider.dimension(),
                text.len()
            );
            Ok(vec![0.0; provider.dimension()])
        }
    }
}
