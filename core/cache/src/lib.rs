//! Cache storage for Harbor.
//!
//! This module provides a trait-based interface for cache backends
//! (in-memory, local filesystem) and the namespace manager that maps the
//! three worker purposes onto versioned partitions.
//!
//! # Design Principles
//! - Injected storage: strategies only see `CacheStore`, never a backend
//! - Full replacement: entries are written whole, the last writer wins
//! - Isolated failures: one broken partition never blocks the others

pub mod local;
pub mod memory;
pub mod namespace;
pub mod registry;
pub mod store;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use namespace::{CacheNamespace, PartitionHandle, PruneReport, Purpose};
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
pub use store::{CacheStore, CachedEntry};
