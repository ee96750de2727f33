//! Cache store trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harbor_common::{Error, Headers, RequestKey, Response, ResponseSource, Result};

/// A cached response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    /// Key of the request that produced this response.
    pub key: RequestKey,
    /// Response status.
    pub status: u16,
    /// Response reason phrase.
    pub status_text: String,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    #[serde(with = "body_encoding")]
    pub body: Vec<u8>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Snapshot a response under `key`.
    pub fn from_response(key: RequestKey, response: &Response) -> Self {
        Self {
            key,
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a response tagged as coming from the cache.
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            source: ResponseSource::Cache,
        }
    }
}

/// Bodies are stored as base64 so entry files stay compact JSON.
mod body_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Check that a partition name is usable by every backend.
///
/// Names become directory names in `LocalStore`, so only ASCII
/// alphanumerics, `-`, `_` and `.` are accepted.
pub fn validate_partition_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Partition name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "Partition name cannot start with '.': {}",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidInput(format!(
            "Invalid partition name: {}",
            name
        )));
    }
    Ok(())
}

/// Cache storage capability.
///
/// A store holds named partitions, each mapping request keys to cached
/// entries. Partitions are created implicitly by the first `put`.
/// There are no transactions: concurrent writers to the same key race and
/// the last completed write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the store name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Ensure a partition exists.
    async fn open(&self, partition: &str) -> Result<()>;

    /// Check whether a partition exists.
    async fn has(&self, partition: &str) -> Result<bool>;

    /// Look up an entry.
    ///
    /// # Returns
    /// `None` when either the partition or the key is missing.
    async fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

    /// Insert or fully replace the entry for `entry.key`.
    ///
    /// # Postconditions
    /// - Partition exists
    /// - A following `match_entry` for the same key returns this entry
    async fn put(&self, partition: &str, entry: CachedEntry) -> Result<()>;

    /// Remove a single entry. Returns whether it existed.
    async fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool>;

    /// Remove a partition and everything in it. Returns whether it existed.
    async fn delete(&self, partition: &str) -> Result<bool>;

    /// Names of all partitions, sorted.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Keys of all entries in a partition, sorted.
    async fn entry_keys(&self, partition: &str) -> Result<Vec<RequestKey>>;
}
