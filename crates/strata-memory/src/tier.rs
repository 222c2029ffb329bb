//! Uniform contract implemented by every storage tier.

use crate::error::MemoryError;
use crate::model::MemoryRecord;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
/// Store / search / cleanup over one storage backend.
pub trait MemoryTier: Send + Sync {
    /// Short label used in logs and search results.
    fn name(&self) -> &'static str;

    /// Upsert a record by key; a later store replaces an earlier one.
    async fn store(&self, record: MemoryRecord, cancel: &CancellationToken)
    -> Result<(), MemoryError>;

    /// Up to `limit` non-expired records, most similar to `query` first.
    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Remove expired records, returning how many were removed.
    async fn cleanup(&self, cancel: &CancellationToken) -> Result<usize, MemoryError>;
}

/// Fail fast when the caller has already given up.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<(), MemoryError> {
    if cancel.is_cancelled() {
        return Err(MemoryError::Cancelled);
    }
    Ok(())
}
