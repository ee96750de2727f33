//! Store registry for config-driven store resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use harbor_common::{Error, Result};

use crate::store::CacheStore;

/// Factory function type for creating stores.
pub type StoreFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn CacheStore>> + Send + Sync>;

/// Registry for cache store factories.
///
/// Hosts name a store kind in their configuration ("memory", "local") and
/// the registry turns that name plus a JSON config into a live store.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a store factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Store '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a store by name and configuration.
    ///
    /// # Errors
    /// - Store kind not registered
    /// - Configuration invalid for the store
    pub fn resolve(&self, name: &str, config: &Value) -> Result<Arc<dyn CacheStore>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Store '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get the sorted list of registered store names.
    pub fn stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a store kind is registered.
    pub fn has_store(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in stores.
pub fn create_default_registry() -> StoreRegistry {
    let mut factories: HashMap<String, StoreFactory> = HashMap::new();

    factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryStore::new()))),
    );

    factories.insert(
        "local".to_string(),
        Box::new(|config| {
            let root = config
                .get("root")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Config("Local store requires 'root' path".to_string()))?;
            Ok(Arc::new(crate::local::LocalStore::new(root)?))
        }),
    );

    StoreRegistry { factories }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = StoreRegistry::new();
        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryStore::new()))))
            .unwrap();

        let store = registry.resolve("test", &Value::Null).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = StoreRegistry::new();
        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryStore::new()))))
            .unwrap();

        let result = registry.register("test", Box::new(|_| Ok(Arc::new(MemoryStore::new()))));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = StoreRegistry::new();
        assert!(registry.resolve("unknown", &Value::Null).is_err());
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert_eq!(registry.stores(), vec!["local".to_string(), "memory".to_string()]);

        let temp = TempDir::new().unwrap();
        let config = serde_json::json!({ "root": temp.path().join("cache") });
        let store = registry.resolve("local", &config).unwrap();
        assert_eq!(store.name(), "local");

        assert!(matches!(
            registry.resolve("local", &Value::Null),
            Err(Error::Config(_))
        ));
    }
}
