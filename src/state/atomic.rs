//! Atomic JSON load/save, shared by every state record.
//!
//! Save is: serialize, write to `path.tmp`, fsync, rename over `path`. On
//! failure the write is retried up to 3 times with a 100ms backoff, matching
//! the retry discipline `content_saver::compression::save_compressed_file`
//! applies to compressed content writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Load `T` from `path` if it exists, otherwise return `default`.
pub async fn load_or_default<T: DeserializeOwned>(path: &Path, default: T) -> anyhow::Result<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` and atomically replace `path` with it, retrying
/// transient failures.
pub async fn save_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_path_for(path);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        match write_fsync_rename(&tmp_path, path, &body).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "atomic save of {} failed (attempt {}/{}): {e}",
                    path.display(),
                    attempt + 1,
                    MAX_RETRIES
                );
                last_err = Some(e);
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("atomic save failed with no recorded error")))
}

/// Synchronous variant for the signal-handler flush path, where no async
/// runtime may be available to drive an `.await`.
pub fn save_atomic_sync<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_path_for(path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        match write_fsync_rename_sync(&tmp_path, path, &body) {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "sync atomic save of {} failed (attempt {}/{}): {e}",
                    path.display(),
                    attempt + 1,
                    MAX_RETRIES
                );
                last_err = Some(e);
                std::thread::sleep(RETRY_BACKOFF);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("sync atomic save failed with no recorded error")))
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

async fn write_fsync_rename(tmp_path: &Path, path: &Path, body: &[u8]) -> anyhow::Result<()> {
    let file = tokio::fs::File::create(tmp_path).await?;
    {
        use tokio::io::AsyncWriteExt;
        let mut file = file;
        file.write_all(body).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(tmp_path, path).await?;
    Ok(())
}

fn write_fsync_rename_sync(tmp_path: &Path, path: &Path, body: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(tmp_path)?;
    file.write_all(body)?;
    file.sync_all()?;
    std::fs::rename(tmp_path, path)?;
    Ok(())
}

/// A thin, generic wrapper pairing a path with its in-memory record, so each
/// typed store (`Progress`, `FreeRecord`, ...) only needs to implement
/// `initialize`/`save`/`save_sync` in terms of this.
pub struct AtomicJsonStore<T> {
    path: PathBuf,
    pub value: T,
}

impl<T: Serialize + DeserializeOwned + Default> AtomicJsonStore<T> {
    pub async fn initialize(path: PathBuf) -> anyhow::Result<Self> {
        let value = load_or_default(&path, T::default()).await?;
        Ok(Self { path, value })
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        save_atomic(&self.path, &self.value).await
    }

    pub fn save_sync(&self) -> anyhow::Result<()> {
        save_atomic_sync(&self.path, &self.value)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
