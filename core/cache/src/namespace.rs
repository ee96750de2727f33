//! Versioned cache partitions.
//!
//! The worker keeps three partitions, one per [`Purpose`]. Their names embed
//! a shared version string, so bumping the version renames all three at
//! once and the next activation deletes every partition of the previous
//! version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use harbor_common::{Error, Request, RequestKey, Response, Result};

use crate::store::{validate_partition_name, CacheStore, CachedEntry};

/// What a partition is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// Same-origin application assets.
    Shell,
    /// Read-only cross-origin API responses.
    ExternalApi,
    /// The offline fallback document.
    OfflineFallback,
}

impl Purpose {
    /// All purposes, in canonical order.
    pub const ALL: [Purpose; 3] = [Purpose::Shell, Purpose::ExternalApi, Purpose::OfflineFallback];

    /// Name segment used in the partition name.
    pub fn segment(&self) -> &'static str {
        match self {
            Purpose::Shell => "cache",
            Purpose::ExternalApi => "api",
            Purpose::OfflineFallback => "offline",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::Shell => "shell",
            Purpose::ExternalApi => "external-api",
            Purpose::OfflineFallback => "offline-fallback",
        };
        f.write_str(name)
    }
}

/// Outcome of pruning partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Partitions that were deleted.
    pub deleted: Vec<String>,
    /// Partitions left in place because they belong to the current set.
    pub kept: Vec<String>,
    /// Partitions whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl PruneReport {
    /// Whether every deletion succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to one partition of a store.
#[derive(Clone)]
pub struct PartitionHandle {
    store: Arc<dyn CacheStore>,
    name: String,
}

impl PartitionHandle {
    /// Partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the cached response for a request.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        self.match_key(&request.key()).await
    }

    /// Look up the cached response for a key.
    pub async fn match_key(&self, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .store
            .match_entry(&self.name, key)
            .await?
            .map(|entry| entry.to_response()))
    }

    /// Store a copy of `response` under the request's key.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        let entry = CachedEntry::from_response(request.key(), response);
        self.store.put(&self.name, entry).await
    }

    /// Remove the entry for a request.
    pub async fn delete(&self, request: &Request) -> Result<bool> {
        self.store.delete_entry(&self.name, &request.key()).await
    }

    /// Keys of every entry in the partition.
    pub async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.store.entry_keys(&self.name).await
    }
}

/// Cache namespace manager.
///
/// Owns the mapping from purpose to partition name for one version and
/// prunes partitions that fall outside the current set.
#[derive(Clone)]
pub struct CacheNamespace {
    store: Arc<dyn CacheStore>,
    prefix: String,
    version: String,
}

impl CacheNamespace {
    /// Create a namespace over `store`.
    ///
    /// # Errors
    /// - Prefix or version empty, or not valid in a partition name
    pub fn new(
        store: Arc<dyn CacheStore>,
        prefix: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.into();
        let version = version.into();
        if prefix.is_empty() || version.is_empty() {
            return Err(Error::Config(
                "Cache prefix and version must be non-empty".to_string(),
            ));
        }
        validate_partition_name(&format!("{}-{}", prefix, version))
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            store,
            prefix,
            version,
        })
    }

    /// Active version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Underlying store.
    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.store.clone()
    }

    /// Partition name for a purpose under the active version.
    pub fn partition_name(&self, purpose: Purpose) -> String {
        format!("{}-{}-{}", self.prefix, purpose.segment(), self.version)
    }

    /// The three canonical partition names of the active version.
    pub fn current_names(&self) -> BTreeSet<String> {
        Purpose::ALL
            .iter()
            .map(|purpose| self.partition_name(*purpose))
            .collect()
    }

    /// Handle for a purpose without touching storage.
    ///
    /// The partition is created by the first write.
    pub fn handle(&self, purpose: Purpose) -> PartitionHandle {
        PartitionHandle {
            store: self.store.clone(),
            name: self.partition_name(purpose),
        }
    }

    /// Open (create if missing) the partition for a purpose.
    pub async fn open(&self, purpose: Purpose) -> Result<PartitionHandle> {
        let handle = self.handle(purpose);
        self.store.open(handle.name()).await?;
        Ok(handle)
    }

    /// Delete every partition not in `current`.
    ///
    /// Each deletion is attempted independently; failures are recorded in
    /// the report and never stop the remaining deletions.
    ///
    /// # Errors
    /// - The store cannot list its partitions
    pub async fn activate(&self, current: &BTreeSet<String>) -> Result<PruneReport> {
        let names = self.store.keys().await?;
        let mut report = PruneReport::default();

        for name in names {
            if current.contains(&name) {
                report.kept.push(name);
                continue;
            }
            self.delete_into(&name, &mut report).await;
        }

        info!(
            "Activated cache version {}: {} deleted, {} kept, {} failed",
            self.version,
            report.deleted.len(),
            report.kept.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Prune against this namespace's own current set.
    pub async fn activate_current(&self) -> Result<PruneReport> {
        self.activate(&self.current_names()).await
    }

    /// Delete every partition, including the current ones.
    ///
    /// # Errors
    /// - The store cannot list its partitions
    pub async fn clear_all(&self) -> Result<PruneReport> {
        let names = self.store.keys().await?;
        let mut report = PruneReport::default();

        for name in names {
            self.delete_into(&name, &mut report).await;
        }

        info!(
            "Cleared caches: {} deleted, {} failed",
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn delete_into(&self, name: &str, report: &mut PruneReport) {
        match self.store.delete(name).await {
            Ok(_) => {
                debug!("Deleted cache partition: {}", name);
                report.deleted.push(name.to_string());
            }
            Err(e) => {
                warn!("Failed to delete cache partition {}: {}", name, e);
                report.failed.push((name.to_string(), e.to_string()));
            }
        }
    }
}
