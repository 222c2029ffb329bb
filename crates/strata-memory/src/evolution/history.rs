//! Append-only audit log of evolution cycles, in its own SQLite file.

use crate::error::MemoryError;
use crate::model::MemoryStats;
use crate::sqlite::{ensure_parent_dir, with_connection};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS evolution_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp DATETIME NOT NULL,
        summary TEXT NOT NULL,
        improvements TEXT NOT NULL,
        memory_state BLOB NOT NULL
    );";

/// One completed evolution cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    /// Row id, increasing with every append.
    pub id: i64,
    /// Completion time of the cycle.
    pub timestamp: DateTime<Utc>,
    /// Batch summaries produced by the cycle.
    pub summary: Vec<String>,
    /// Improvements generated by the cycle.
    pub improvements: Vec<String>,
    /// Durable tier statistics after cleanup.
    pub memory_state: MemoryStats,
}

/// Handle to the evolution history database.
#[derive(Debug, Clone)]
pub struct EvolutionLog {
    path: PathBuf,
}

impl EvolutionLog {
    /// Open (or create) the log at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;
        with_connection(&path, &CancellationToken::new(), |conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        info!("opened evolution log (path={})", path.display());
        Ok(Self { path })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a cycle and return its id.
    pub async fn append(
        &self,
        timestamp: DateTime<Utc>,
        summary: &[String],
        improvements: &[String],
        memory_state: &MemoryStats,
        cancel: &CancellationToken,
    ) -> Result<i64, MemoryError> {
        let summary = serde_json::to_string(summary)?;
        let improvements = serde_json::to_string(improvements)?;
        let memory_state = serde_json::to_vec(memory_state)?;
        with_connection(&self.path, cancel, move |conn| {
            conn.execute(
                "INSERT INTO evolution_history (timestamp, summary, improvements, memory_state)
                 VALUES (?1, ?2, ?3, ?4)",
                params![timestamp, summary, improvements, memory_state],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Time of the most recent cycle, if any.
    pub async fn last_timestamp(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<DateTime<Utc>>, MemoryError> {
        with_connection(&self.path, cancel, |conn| {
            let last = conn.query_row("SELECT MAX(timestamp) FROM evolution_history", [], |row| {
                row.get::<_, Option<DateTime<Utc>>>(0)
            })?;
            Ok(last)
        })
        .await
    }

    /// Up to `limit` most recent cycles, newest first.
    pub async fn history(
        &self,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<EvolutionRecord>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        with_connection(&self.path, cancel, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, summary, improvements, memory_state
                 FROM evolution_history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| Ok(decode_row(row)))?;
            let mut records = Vec::new();
            for row in rows {
                match row? {
                    Ok(record) => records.push(record),
                    Err(err) => warn!("skipping malformed evolution record: {err}"),
                }
            }
            Ok(records)
        })
        .await
    }
}

fn decode_row(row: &Row<'_>) -> Result<EvolutionRecord, MemoryError> {
    let summary: String = row.get(2)?;
    let improvements: String = row.get(3)?;
    let memory_state: Vec<u8> = row.get(4)?;
    Ok(EvolutionRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        summary: serde_json::from_str(&summary)?,
        improvements: serde_json::from_str(&improvements)?,
        memory_state: serde_json::from_slice(&memory_state)?,
    })
}
