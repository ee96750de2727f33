//! Worker configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use harbor_cache::store::validate_partition_name;
use harbor_common::{Error, Result};
use harbor_net::http::DEFAULT_USER_AGENT;
use harbor_sync::{RetryConfig, DEFAULT_SYNC_TAG};

/// Config file name looked up in the data directory.
pub const CONFIG_FILENAME: &str = "harbor.json";

/// Which cache store to build and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store kind registered in the `StoreRegistry` ("memory", "local").
    pub kind: String,
    /// Store-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            config: serde_json::Value::Null,
        }
    }
}

/// Configuration of one worker version.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Registration scope. Its origin is the worker's own origin.
    pub scope: String,
    /// Prefix shared by all partition names.
    pub cache_prefix: String,
    /// Version string embedded in partition names.
    pub version: String,
    /// Shell assets pre-cached on install, relative to the scope.
    pub critical_assets: Vec<String>,
    /// Offline fallback document, relative to the scope.
    pub offline_document: String,
    /// Background sync tag that replays pending operations.
    pub sync_tag: String,
    /// Cache store selection.
    pub store: StoreConfig,
    /// Directory of the durable pending-operation queue.
    pub queue_path: Option<PathBuf>,
    /// User agent for outgoing requests.
    pub user_agent: String,
    /// Reschedule policy for failed sync batches.
    pub reschedule: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: "http://localhost/".to_string(),
            cache_prefix: "harbor".to_string(),
            version: "v1".to_string(),
            critical_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.webmanifest".to_string(),
            ],
            offline_document: "/offline.html".to_string(),
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            store: StoreConfig::default(),
            queue_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            reschedule: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Read and validate a JSON config file.
    ///
    /// # Errors
    /// - File unreadable
    /// - Invalid JSON
    /// - Fails [`WorkerConfig::validate`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Deserialize configuration from JSON without validating it.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    /// - Scope is not an absolute http(s) URL
    /// - Prefix or version is empty or not usable in a partition name
    /// - Sync tag is empty
    /// - An asset path cannot be resolved against the scope
    pub fn validate(&self) -> Result<()> {
        let scope = self.scope_url()?;

        if self.cache_prefix.is_empty() {
            return Err(Error::Config("Cache prefix must not be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(Error::Config("Version must not be empty".to_string()));
        }
        validate_partition_name(&format!("{}-{}", self.cache_prefix, self.version))
            .map_err(|e| Error::Config(e.to_string()))?;

        if self.sync_tag.trim().is_empty() {
            return Err(Error::Config("Sync tag must not be empty".to_string()));
        }

        for asset in self.critical_assets.iter().chain([&self.offline_document]) {
            resolve(&scope, asset)?;
        }

        Ok(())
    }

    /// The scope as a URL.
    ///
    /// # Errors
    /// - Scope is relative, unparsable, or not http(s)
    pub fn scope_url(&self) -> Result<Url> {
        let scope = Url::parse(&self.scope)
            .map_err(|e| Error::Config(format!("Invalid scope '{}': {}", self.scope, e)))?;
        if !matches!(scope.scheme(), "http" | "https") || scope.host_str().is_none() {
            return Err(Error::Config(format!(
                "Scope must be an absolute http(s) URL: {}",
                self.scope
            )));
        }
        Ok(scope)
    }

    /// Resolve a scope-relative path.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        resolve(&self.scope_url()?, path)
    }

    /// URLs of the assets pre-cached on install.
    pub fn critical_asset_urls(&self) -> Result<Vec<Url>> {
        let scope = self.scope_url()?;
        self.critical_assets
            .iter()
            .map(|asset| resolve(&scope, asset))
            .collect()
    }

    /// URL of the offline fallback document.
    pub fn offline_document_url(&self) -> Result<Url> {
        self.resolve(&self.offline_document)
    }
}

fn resolve(scope: &Url, path: &str) -> Result<Url> {
    scope
        .join(path)
        .map_err(|e| Error::Config(format!("Cannot resolve '{}' against scope: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = WorkerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sync_tag, "sync-pending-updates");
        assert_eq!(
            config.offline_document_url().unwrap().as_str(),
            "http://localhost/offline.html"
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = WorkerConfig::from_json(
            r#"{ "scope": "https://app.example/", "version": "v7" }"#,
        )
        .unwrap();

        assert_eq!(config.version, "v7");
        assert_eq!(config.cache_prefix, "harbor");
        assert_eq!(config.store.kind, "memory");
        assert_eq!(
            config.critical_asset_urls().unwrap()[1].as_str(),
            "https://app.example/index.html"
        );
    }

    #[test]
    fn test_rejects_relative_scope() {
        let config = WorkerConfig {
            scope: "/app/".to_string(),
            ..WorkerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = WorkerConfig {
            scope: "file:///srv/app/".to_string(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_version_and_prefix() {
        let config = WorkerConfig {
            version: String::new(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            cache_prefix: String::new(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            version: "v1/../x".to_string(),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);

        let config = WorkerConfig {
            version: "v2".to_string(),
            ..WorkerConfig::default()
        };
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        assert_eq!(WorkerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            WorkerConfig::load(temp.path().join("nope.json")),
            Err(Error::Config(_))
        ));
    }
}
