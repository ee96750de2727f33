//! Durable queue backed by a directory of operation files.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use harbor_common::{Error, Result};

use crate::operation::PendingOperation;
use crate::queue::{sort_oldest_first, PendingStore};

const ENTRY_EXTENSION: &str = "json";

/// Pending-operation queue persisted as one JSON file per operation id.
///
/// Every mutation touches only its own file, so a foreground process
/// enqueuing into the same directory never clobbers operations the worker
/// is replaying or removing. Writes go through a temporary file and an
/// atomic rename; `list` re-reads the directory on every call.
///
/// `update` only rewrites a file that still exists. Only one process may
/// replay (update and remove) a given directory.
pub struct FileQueue {
    /// Directory holding the operation files.
    dir: PathBuf,
}

impl FileQueue {
    /// Open a queue rooted at `dir`, creating it if needed.
    ///
    /// # Errors
    /// - Directory cannot be created
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error(&dir, e))?;
        Ok(Self { dir })
    }

    /// Directory holding the operation files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::InvalidInput(format!(
                "Invalid pending operation id: {:?}",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.{}", id, ENTRY_EXTENSION)))
    }

    async fn write_entry(&self, path: &Path, op: &PendingOperation) -> Result<()> {
        let json = serde_json::to_vec_pretty(op)?;
        let tmp = self.dir.join(format!(".{}.{}.tmp", op.id, Uuid::new_v4()));

        fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_error(path, e));
        }
        Ok(())
    }

    async fn read_entry(path: &Path) -> Result<Option<PendingOperation>> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                Error::Storage(format!("Corrupt pending operation {}: {}", path.display(), e))
            }),
            // Removed between the directory scan and the read.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(path, e)),
        }
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> Error {
    Error::Storage(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl PendingStore for FileQueue {
    async fn enqueue(&self, op: PendingOperation) -> Result<()> {
        let path = self.entry_path(&op.id)?;
        debug!("Queueing pending operation {} {} {}", op.id, op.method, op.url);
        self.write_entry(&path, &op).await
    }

    async fn list(&self) -> Result<Vec<PendingOperation>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, e))?;

        let mut ops = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(op) = Self::read_entry(&path).await? {
                ops.push(op);
            }
        }

        sort_oldest_first(&mut ops);
        Ok(ops)
    }

    async fn update(&self, op: PendingOperation) -> Result<bool> {
        let path = self.entry_path(&op.id)?;
        match fs::metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(storage_error(&path, e)),
        }
        self.write_entry(&path, &op).await?;
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let path = self.entry_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(&path, e)),
        }
    }
}
