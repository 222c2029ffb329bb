//! Per-operation SQLite connections run on the blocking pool.

use crate::error::MemoryError;
use crate::tier::ensure_active;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a fresh connection to `path`, run `op` on it off the async runtime,
/// and close it afterwards.
///
/// Raising `cancel` interrupts the running statement and returns
/// `MemoryError::Cancelled` without waiting for the blocking task.
pub(crate) async fn with_connection<T, F>(
    path: &Path,
    cancel: &CancellationToken,
    op: F,
) -> Result<T, MemoryError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, MemoryError> + Send + 'static,
{
    ensure_active(cancel)?;
    let path: PathBuf = path.to_path_buf();
    let task_cancel = cancel.clone();
    let (handle_tx, mut handle_rx) = oneshot::channel();
    let task = tokio::task::spawn_blocking(move || {
        let mut conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _ = handle_tx.send(conn.get_interrupt_handle());
        ensure_active(&task_cancel)?;
        op(&mut conn)
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Ok(handle) = handle_rx.try_recv() {
                handle.interrupt();
            }
            Err(MemoryError::Cancelled)
        }
        joined = task => joined?,
    }
}

/// Create the parent directory of a database file.
pub(crate) async fn ensure_parent_dir(path: &Path) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
