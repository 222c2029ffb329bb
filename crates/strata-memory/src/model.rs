//! Memory record model shared by every tier.

use crate::error::MemoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single memory: text, its embedding, and its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Identifier, unique within one tier.
    pub key: String,
    /// Text payload.
    pub content: String,
    /// Embedding vector; empty when none was computed.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Store time.
    #[serde(rename = "timestamp", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    /// Expiry time; `None` never expires.
    #[serde(default, rename = "expiresAt", alias = "expires_at")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    /// Build a record that never expires.
    pub fn new(
        key: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            embedding,
            created_at,
            expires_at: None,
        }
    }

    /// Set the expiry time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// A record is expired once `expires_at <= now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Reject records that no tier can address.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.key.is_empty() {
            return Err(MemoryError::InvalidKey(self.key.clone()));
        }
        Ok(())
    }
}

/// Aggregate statistics over the durable tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryStats {
    /// Number of stored memories, expired or not.
    pub total_memories: u64,
    /// Memories with an expiry time set.
    pub expiring_memories: u64,
    /// Oldest `created_at`.
    pub oldest_memory: Option<DateTime<Utc>>,
    /// Newest `created_at`.
    pub newest_memory: Option<DateTime<Utc>>,
}

/// Search hit returned by the memory manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    /// Matching record.
    pub record: MemoryRecord,
    /// Cosine similarity to the query embedding.
    pub similarity: f32,
    /// Tier that produced the record.
    pub tier: &'static str,
}
