//! Disk-backed cached tier: one JSON file per record plus an in-memory mirror.

use crate::clock::Clock;
use crate::error::MemoryError;
use crate::model::MemoryRecord;
use crate::similarity::rank_records;
use crate::tier::{MemoryTier, ensure_active};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

const RECORD_EXTENSION: &str = "json";

#[derive(Debug)]
struct Slot {
    seq: u64,
    record: MemoryRecord,
}

#[derive(Debug, Default)]
struct Mirror {
    records: HashMap<String, Slot>,
    next_seq: u64,
}

impl Mirror {
    fn insert(&mut self, record: MemoryRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(record.key.clone(), Slot { seq, record });
    }
}

/// Cached tier owning a record directory and its mirror.
///
/// Every mutation of the mirror and of the directory happens while holding
/// the same lock, so concurrent stores and cleanups never interleave.
#[derive(Debug)]
pub struct CachedTier {
    root: PathBuf,
    mirror: Mutex<Mirror>,
    clock: Arc<dyn Clock>,
}

impl CachedTier {
    /// Open (creating if needed) the directory at `root` and load its records.
    ///
    /// Unreadable, malformed, or already expired files are skipped.
    pub async fn open(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let now = clock.now();
        let mut mirror = Mirror::default();
        let mut skipped = 0usize;
        for path in paths {
            match load_record(&path).await {
                Ok(record) if record.is_expired(now) => {
                    debug!("skipping expired memory file (path={})", path.display());
                    skipped += 1;
                }
                Ok(record) => mirror.insert(record),
                Err(err) => {
                    warn!("skipping unreadable memory file (path={}): {err}", path.display());
                    skipped += 1;
                }
            }
        }
        info!(
            "opened cached memory tier (root={}, loaded={}, skipped={})",
            root.display(),
            mirror.records.len(),
            skipped
        );
        Ok(Self {
            root,
            mirror: Mutex::new(mirror),
            clock,
        })
    }

    /// Directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record under `key` from the mirror.
    pub async fn get(&self, key: &str) -> Option<MemoryRecord> {
        let mirror = self.mirror.lock().await;
        mirror.records.get(key).map(|slot| slot.record.clone())
    }

    /// Number of mirrored records.
    pub async fn len(&self) -> usize {
        self.mirror.lock().await.records.len()
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{RECORD_EXTENSION}.tmp"))
    }

    async fn lock(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, Mirror>, MemoryError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MemoryError::Cancelled),
            guard = self.mirror.lock() => Ok(guard),
        }
    }
}

#[async_trait]
impl MemoryTier for CachedTier {
    fn name(&self) -> &'static str {
        "cached"
    }

    /// Update the mirror, then write the record file through.
    ///
    /// A failed write is reported but the mirror keeps the new record; the
    /// next successful write or a reload brings disk and memory back in line.
    async fn store(
        &self,
        record: MemoryRecord,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        record.validate()?;
        validate_file_key(&record.key)?;
        ensure_active(cancel)?;
        let bytes = serde_json::to_vec_pretty(&record)?;
        let key = record.key.clone();
        let path = self.record_path(&key);
        let temp_path = self.temp_path(&key);

        let mut mirror = self.lock(cancel).await?;
        mirror.insert(record);
        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MemoryError::Cancelled),
            result = write_file(&temp_path, &path, &bytes) => result,
        };
        drop(mirror);

        match written {
            Ok(()) => {
                debug!("stored cached memory (key={key}, bytes={})", bytes.len());
                Ok(())
            }
            Err(err) => {
                warn!("cached memory write failed, mirror kept (key={key}): {err}");
                Err(err)
            }
        }
    }

    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let now = self.clock.now();
        let mirror = self.lock(cancel).await?;
        let mut candidates: Vec<(u64, MemoryRecord)> = mirror
            .records
            .values()
            .filter(|slot| !slot.record.is_expired(now))
            .map(|slot| (slot.seq, slot.record.clone()))
            .collect();
        drop(mirror);
        candidates.sort_by_key(|(seq, _)| *seq);
        Ok(rank_records(
            candidates.into_iter().map(|(_, record)| record),
            query,
            limit,
        ))
    }

    async fn cleanup(&self, cancel: &CancellationToken) -> Result<usize, MemoryError> {
        let now = self.clock.now();
        let mut mirror = self.lock(cancel).await?;
        let expired: Vec<String> = mirror
            .records
            .iter()
            .filter(|(_, slot)| slot.record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0usize;
        for key in expired {
            ensure_active(cancel)?;
            mirror.records.remove(&key);
            remove_file_if_present(&self.record_path(&key)).await?;
            removed += 1;
        }
        if removed > 0 {
            info!("cleaned cached memories (removed={removed})");
        }
        Ok(removed)
    }
}

/// Keys become file names, so they must be a single safe path component.
fn validate_file_key(key: &str) -> Result<(), MemoryError> {
    let unsafe_key = key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || Path::new(key).is_absolute();
    if unsafe_key {
        return Err(MemoryError::InvalidKey(key.to_string()));
    }
    Ok(())
}

async fn load_record(path: &Path) -> Result<MemoryRecord, MemoryError> {
    let bytes = tokio::fs::read(path).await?;
    let record: MemoryRecord = serde_json::from_slice(&bytes)?;
    record.validate()?;
    Ok(record)
}

/// Write to a temp file, then rename over the record file.
async fn write_file(temp_path: &Path, path: &Path, bytes: &[u8]) -> Result<(), MemoryError> {
    tokio::fs::write(temp_path, bytes).await?;
    tokio::fs::rename(temp_path, path).await?;
    Ok(())
}

async fn remove_file_if_present(path: &Path) -> Result<(), MemoryError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(MemoryError::Io(err)),
    }
}
