//! In-memory cache store for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use harbor_common::{Error, RequestKey, Result};

use crate::store::{validate_partition_name, CacheStore, CachedEntry};

type Partitions = HashMap<String, BTreeMap<RequestKey, CachedEntry>>;

/// In-memory cache store.
///
/// Useful for testing and ephemeral hosts. All data is stored in memory
/// and lost on drop. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<RwLock<Partitions>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Partitions>> {
        self.partitions
            .read()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Partitions>> {
        self.partitions
            .write()
            .map_err(|_| Error::Storage("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, partition: &str) -> Result<()> {
        validate_partition_name(partition)?;
        self.write()?.entry(partition.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, partition: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(partition))
    }

    async fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
        Ok(self
            .read()?
            .get(partition)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, partition: &str, entry: CachedEntry) -> Result<()> {
        validate_partition_name(partition)?;
        self.write()?
            .entry(partition.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
        Ok(self
            .write()?
            .get_mut(partition)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn delete(&self, partition: &str) -> Result<bool> {
        Ok(self.write()?.remove(partition).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn entry_keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .read()?
            .get(partition)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
