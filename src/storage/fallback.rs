//! Local Fallback Store: last-resort durable copy of undeliverable batches
//!
//! Each batch becomes one file named
//! `telemetry_fallback_<unix-ts>_<uuid>.json` holding the same JSON array
//! the channels send. Files are written to a `.tmp` sibling, synced, then
//! renamed into place, so a crash never leaves a partial file under the
//! final name. The directory is synced after the rename where the platform
//! allows it.
//!
//! Nothing here re-uploads persisted batches. `pending` and `load` exist
//! for operators and external recovery tooling.

use crate::config::defaults::FALLBACK_FILE_PREFIX;
use crate::types::{Batch, BatchCodecError};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TMP_EXTENSION: &str = "tmp";

/// Fallback store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Serialization(#[from] BatchCodecError),
    #[error("corrupted fallback file {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: BatchCodecError,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory of persisted batches.
#[derive(Debug, Clone)]
pub struct LocalFallbackStore {
    dir: PathBuf,
}

impl LocalFallbackStore {
    /// Create or open a store at the given directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let store = Self { dir };

        match store.pending() {
            Ok(files) if !files.is_empty() => {
                info!(
                    dir = %store.dir.display(),
                    pending = files.len(),
                    "Fallback store opened with persisted batches awaiting recovery"
                );
            }
            Ok(_) => debug!(dir = %store.dir.display(), "Fallback store opened (empty)"),
            Err(e) => warn!(error = %e, "Could not scan fallback store"),
        }

        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `batch` atomically and return the final file path.
    pub async fn persist(&self, batch: &Batch) -> Result<PathBuf, StoreError> {
        let json = batch.to_json()?;

        let final_path = self.dir.join(unique_file_name());
        let tmp_path = final_path.with_extension(TMP_EXTENSION);

        if let Err(e) = write_synced(&tmp_path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::io(&final_path, e));
        }

        // Rename is only durable once the directory entry hits the disk
        if let Err(e) = sync_dir(&self.dir).await {
            debug!(dir = %self.dir.display(), error = %e, "Fallback directory sync failed");
        }

        debug!(
            batch_id = %batch.id(),
            path = %final_path.display(),
            size_bytes = json.len(),
            "Batch persisted to fallback store"
        );
        Ok(final_path)
    }

    /// Persisted batch files, oldest first. Temp files are skipped.
    pub fn pending(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| is_fallback_file(p))
            .collect();

        // Names lead with the unix timestamp
        files.sort();
        Ok(files)
    }

    /// Read a persisted batch back.
    pub fn load(&self, path: &Path) -> Result<Batch, StoreError> {
        let data = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        Batch::from_json(&data).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(path, e))
}

/// Best effort: not every platform can open a directory for syncing.
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

/// Unique per persistence event, even for two writes of the same batch.
fn unique_file_name() -> String {
    format!(
        "{}{}_{}.json",
        FALLBACK_FILE_PREFIX,
        chrono::Utc::now().timestamp(),
        Uuid::new_v4().simple()
    )
}

fn is_fallback_file(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(FALLBACK_FILE_PREFIX));
    named && path.extension().and_then(|e| e.to_str()) == Some("json")
}
