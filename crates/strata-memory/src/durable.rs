//! Durable tier backed by a single SQLite file; the system of record.

use crate::clock::Clock;
use crate::error::MemoryError;
use crate::model::{MemoryRecord, MemoryStats};
use crate::similarity::rank_records;
use crate::sqlite::{ensure_parent_dir, with_connection};
use crate::tier::MemoryTier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memories (
        key TEXT PRIMARY KEY,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        timestamp DATETIME NOT NULL,
        expires_at DATETIME
    );";

const SELECT_COLUMNS: &str = "SELECT key, content, embedding, timestamp, expires_at FROM memories";

/// SQLite-backed tier holding every memory with its embedding.
///
/// Similarity search is a full scan ranked in application code.
#[derive(Debug, Clone)]
pub struct DurableTier {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl DurableTier {
    /// Open the database at `path`, creating the file and schema if needed.
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path).await?;
        with_connection(&path, &CancellationToken::new(), |conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        info!("opened durable memory tier (path={})", path.display());
        Ok(Self { path, clock })
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored record in row order, expired ones included.
    pub async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = with_connection(&self.path, cancel, |conn| {
            query_records(conn, &format!("{SELECT_COLUMNS} ORDER BY rowid"), [])
        })
        .await?;
        debug!("loaded all durable memories (count={})", records.len());
        Ok(records)
    }

    /// Record stored under `key`, if any.
    pub async fn get(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<MemoryRecord>, MemoryError> {
        let key = key.to_string();
        with_connection(&self.path, cancel, move |conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE key = ?1");
            let row = conn
                .query_row(&sql, params![key], |row| Ok(decode_row(row)))
                .optional()?;
            Ok(row.and_then(|decoded| decoded.ok()))
        })
        .await
    }

    /// Count, expiring count, and `created_at` range over all rows.
    pub async fn get_stats(&self, cancel: &CancellationToken) -> Result<MemoryStats, MemoryError> {
        with_connection(&self.path, cancel, |conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*), COUNT(expires_at), MIN(timestamp), MAX(timestamp)
                 FROM memories",
                [],
                |row| {
                    Ok(MemoryStats {
                        total_memories: row.get::<_, i64>(0)?.max(0) as u64,
                        expiring_memories: row.get::<_, i64>(1)?.max(0) as u64,
                        oldest_memory: row.get::<_, Option<DateTime<Utc>>>(2)?,
                        newest_memory: row.get::<_, Option<DateTime<Utc>>>(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
        .await
    }
}

#[async_trait]
impl MemoryTier for DurableTier {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn store(
        &self,
        record: MemoryRecord,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        record.validate()?;
        let embedding = serde_json::to_vec(&record.embedding)?;
        let key = record.key.clone();
        with_connection(&self.path, cancel, move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO memories (key, content, embedding, timestamp, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.key,
                    record.content,
                    embedding,
                    record.created_at,
                    record.expires_at
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!("stored durable memory (key={key})");
        Ok(())
    }

    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let candidates = with_connection(&self.path, cancel, move |conn| {
            let sql = format!(
                "{SELECT_COLUMNS} WHERE expires_at IS NULL OR expires_at > ?1 ORDER BY rowid"
            );
            query_records(conn, &sql, params![now])
        })
        .await?;
        debug!(
            "ranking durable memories (candidates={}, limit={limit})",
            candidates.len()
        );
        Ok(rank_records(candidates, query, limit))
    }

    async fn cleanup(&self, cancel: &CancellationToken) -> Result<usize, MemoryError> {
        let now = self.clock.now();
        let removed = with_connection(&self.path, cancel, move |conn| {
            let removed = conn.execute(
                "DELETE FROM memories WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed)
        })
        .await?;
        if removed > 0 {
            info!("cleaned durable memories (removed={removed})");
        }
        Ok(removed)
    }
}

/// Run a record query, skipping rows that fail to decode.
fn query_records<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MemoryRecord>, MemoryError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(decode_row(row)))?;
    let mut records = Vec::new();
    for row in rows {
        match row? {
            Ok(record) => records.push(record),
            Err(err) => warn!("skipping malformed durable memory row: {err}"),
        }
    }
    Ok(records)
}

/// Decode one row. Any failure, SQLite typing included, marks the row as bad.
fn decode_row(row: &Row<'_>) -> Result<MemoryRecord, MemoryError> {
    let key: String = row.get(0)?;
    let content: String = row.get(1)?;
    let embedding = match row.get_ref(2)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => decode_embedding(bytes)
            .map_err(|err| MemoryError::Corrupt(format!("{key}: {err}")))?,
        ValueRef::Null => Vec::new(),
        other => {
            return Err(MemoryError::Corrupt(format!(
                "{key}: unexpected embedding column type {:?}",
                other.data_type()
            )));
        }
    };
    let created_at: DateTime<Utc> = row.get(3)?;
    let expires_at: Option<DateTime<Utc>> = row.get(4)?;
    Ok(MemoryRecord {
        key,
        content,
        embedding,
        created_at,
        expires_at,
    })
}

/// Embeddings are stored as a JSON array of floats.
fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, MemoryError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::DurableTier;
    use crate::clock::{Clock, ManualClock};
    use crate::model::MemoryRecord;
    use crate::tier::MemoryTier;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 10, 9, 30, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn store_then_search_own_embedding_ranks_first() {
        let temp = tempdir().expect("tempdir");
        let clock = clock();
        let cancel = CancellationToken::new();
        let tier = DurableTier::open(temp.path().join("db/long.db"), clock.clone())
            .await
            .expect("open");
        let now = clock.now();
        for (key, embedding) in [
            ("x", vec![0.0, 1.0]),
            ("target", vec![3.0, 4.0]),
            ("y", vec![4.0, 3.0]),
        ] {
            tier.store(MemoryRecord::new(key, key, embedding, now), &cancel)
                .await
                .expect("store");
        }
        let hits = tier
            .search_similar(&[3.0, 4.0], 2, &cancel)
            .await
            .expect("search");
        let keys: Vec<_> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["target", "y"]);
        assert_eq!(hits[0].created_at, now);
    }

    #[tokio::test]
    async fn replace_on_conflict_keeps_latest() {
        let temp = tempdir().expect("tempdir");
        let clock = clock();
        let cancel = CancellationToken::new();
        let tier = DurableTier::open(temp.path().join("long.db"), clock.clone())
            .await
            .expect("open");
        tier.store(MemoryRecord::new("k", "one", vec![1.0], clock.now()), &cancel)
            .await
            .expect("store");
        tier.store(MemoryRecord::new("k", "two", vec![1.0], clock.now()), &cancel)
            .await
            .expect("store");
        let all = tier.get_all(&cancel).await.expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "two");
        let got = tier.get("k", &cancel).await.expect("get").expect("row");
        assert_eq!(got.content, "two");
        assert!(tier.get("missing", &cancel).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn expired_rows_hidden_from_search_until_cleanup_deletes_them() {
        let temp = tempdir().expect("tempdir");
        let clock = clock();
        let cancel = CancellationToken::new();
        let tier = DurableTier::open(temp.path().join("long.db"), clock.clone())
            .await
            .expect("open");
        let now = clock.now();
        tier.store(
            MemoryRecord::new("past", "expired", vec![1.0, 0.0], now - Duration::hours(3))
                .with_expiry(now - Duration::hours(1)),
            &cancel,
        )
        .await
        .expect("store");
        tier.store(
            MemoryRecord::new("future", "alive", vec![1.0, 0.0], now)
                .with_expiry(now + Duration::hours(1)),
            &cancel,
        )
        .await
        .expect("store");
        tier.store(MemoryRecord::new("forever", "kept", vec![0.0, 1.0], now), &cancel)
            .await
            .expect("store");

        let hits = tier
            .search_similar(&[1.0, 0.0], 10, &cancel)
            .await
            .expect("search");
        let keys: Vec<_> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["future", "forever"]);
        assert_eq!(tier.get_all(&cancel).await.expect("all").len(), 3);

        assert_eq!(tier.cleanup(&cancel).await.expect("cleanup"), 1);
        assert_eq!(tier.get_all(&cancel).await.expect("all").len(), 2);

        clock.advance(Duration::hours(2));
        assert_eq!(tier.cleanup(&cancel).await.expect("cleanup"), 1);
        let remaining = tier.get_all(&cancel).await.expect("all");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "forever");
    }

    #[tokio::test]
    async fn stats_cover_counts_and_range() {
        let temp = tempdir().expect("tempdir");
        let clock = clock();
        let cancel = CancellationToken::new();
        let tier = DurableTier::open(temp.path().join("long.db"), clock.clone())
            .await
            .expect("open");

        let empty = tier.get_stats(&cancel).await.expect("stats");
        assert_eq!(empty.total_memories, 0);
        assert_eq!(empty.oldest_memory, None);

        let now = clock.now();
        let oldest = now - Duration::days(3);
        tier.store(MemoryRecord::new("a", "a", vec![], oldest), &cancel)
            .await
            .expect("store");
        tier.store(
            MemoryRecord::new("b", "b", vec![], now).with_expiry(now + Duration::days(1)),
            &cancel,
        )
        .await
        .expect("store");

        let stats = tier.get_stats(&cancel).await.expect("stats");
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.expiring_memories, 1);
        assert_eq!(stats.oldest_memory, Some(oldest));
        assert_eq!(stats.newest_memory, Some(now));
    }

    #[tokio::test]
    async fn malformed_embedding_rows_are_skipped() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("long.db");
        let clock = clock();
        let cancel = CancellationToken::new();
        let tier = DurableTier::open(&path, clock.clone()).await.expect("open");
        tier.store(MemoryRecord::new("good", "ok", vec![1.0], clock.now()), &cancel)
            .await
            .expect("store");

        let conn = rusqlite::Connection::open(&path).expect("conn");
        conn.execute(
            "INSERT INTO memories (key, content, embedding, timestamp) VALUES ('bad', 'x', ?1, ?2)",
            rusqlite::params![b"not-a-vector".to_vec(), clock.now()],
        )
        .expect("insert");
        conn.execute(
            "INSERT INTO memories (key, content, embedding, timestamp) VALUES ('text', 'y', '[0.5]', ?1)",
            rusqlite::params![clock.now()],
        )
        .expect("insert");
        drop(conn);

        let all = tier.get_all(&cancel).await.expect("all");
        let keys: Vec<_> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["good", "text"]);
        assert_eq!(all[1].embedding, vec![0.5]);
    }

    #[tokio::test]
    async fn cancelled_store_does_not_write() {
        let temp = tempdir().expect("tempdir");
        let clock = clock();
        let tier = DurableTier::open(temp.path().join("long.db"), clock.clone())
            .await
            .expect("open");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = tier
            .store(MemoryRecord::new("k", "c", vec![], clock.now()), &cancel)
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        let fresh = CancellationToken::new();
        assert!(tier.get_all(&fresh).await.expect("all").is_empty());
    }
}
