//! Local filesystem cache store.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::{Blake2s256, Digest};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use harbor_common::{Error, RequestKey, Result};

use crate::store::{validate_partition_name, CacheStore, CachedEntry};

/// Extension of committed entry files.
const ENTRY_EXTENSION: &str = "json";

/// Local filesystem cache store.
///
/// Layout: one directory per partition under `root`, one JSON file per
/// entry. Entry file names are the URL-safe base64 of a BLAKE2s digest of
/// the request key, so arbitrary URLs map to fixed-length names.
/// Entries are written to a temporary file and renamed into place, which
/// keeps concurrent writers to one key from leaving a torn file behind.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store with the given root directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        validate_partition_name(partition)?;
        Ok(self.root.join(partition))
    }

    fn entry_file_name(key: &RequestKey) -> String {
        let digest = Blake2s256::digest(key.to_string().as_bytes());
        format!("{}.{}", URL_SAFE_NO_PAD.encode(digest), ENTRY_EXTENSION)
    }

    fn entry_path(&self, partition: &str, key: &RequestKey) -> Result<PathBuf> {
        Ok(self.partition_dir(partition)?.join(Self::entry_file_name(key)))
    }

    async fn read_entry(path: &Path) -> Result<Option<CachedEntry>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(path, e)),
        }
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> Error {
    Error::Storage(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl CacheStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn open(&self, partition: &str) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error(&dir, e))
    }

    async fn has(&self, partition: &str) -> Result<bool> {
        Ok(self.partition_dir(partition)?.is_dir())
    }

    async fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
        let path = self.entry_path(partition, key)?;
        Self::read_entry(&path).await
    }

    async fn put(&self, partition: &str, entry: CachedEntry) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error(&dir, e))?;

        let path = dir.join(Self::entry_file_name(&entry.key));
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let json = serde_json::to_vec(&entry)?;

        fs::write(&tmp, json)
            .await
            .map_err(|e| storage_error(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_error(&path, e));
        }
        Ok(())
    }

    async fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
        let path = self.entry_path(partition, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(&path, e)),
        }
    }

    async fn delete(&self, partition: &str) -> Result<bool> {
        let dir = self.partition_dir(partition)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error(&dir, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| storage_error(&self.root, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(&self.root, e))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if validate_partition_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn entry_keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        let dir = self.partition_dir(partition)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(&dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_error(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(cached)) => keys.push(cached.key),
                Ok(None) => {}
                // An unreadable entry should not hide the rest of the partition.
                Err(e) => warn!("Skipping unreadable cache entry {}: {}", path.display(), e),
            }
        }

        keys.sort();
        Ok(keys)
    }
}
