#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use harbor_cache::{CacheStore, CachedEntry, MemoryStore};
use harbor_common::{RequestKey, Result};
use harbor_net::ScriptedFetcher;
use harbor_sync::{MemoryQueue, PendingStore};
use harbor_worker::{Worker, WorkerConfig, WorkerHost};

pub const SCOPE: &str = "https://app.example/";

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn config(version: &str) -> WorkerConfig {
    WorkerConfig {
        scope: SCOPE.to_string(),
        version: version.to_string(),
        ..WorkerConfig::default()
    }
}

/// Script the critical assets and the offline document.
pub fn script_shell(fetcher: &ScriptedFetcher) {
    for path in ["", "index.html", "manifest.webmanifest"] {
        fetcher.respond_ok(&format!("{}{}", SCOPE, path), &format!("shell:{}", path));
    }
    fetcher.respond_ok("https://app.example/offline.html", "<h1>You are offline</h1>");
}

/// Memory store that counts every call.
#[derive(Clone, Default)]
pub struct TrackingStore {
    pub inner: MemoryStore,
    calls: Arc<AtomicUsize>,
}

impl TrackingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for TrackingStore {
    fn name(&self) -> &str {
        "tracking"
    }
    async fn open(&self, partition: &str) -> Result<()> {
        self.hit();
        self.inner.open(partition).await
    }
    async fn has(&self, partition: &str) -> Result<bool> {
        self.hit();
        self.inner.has(partition).await
    }
    async fn match_entry(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
        self.hit();
        self.inner.match_entry(partition, key).await
    }
    async fn put(&self, partition: &str, entry: CachedEntry) -> Result<()> {
        self.hit();
        self.inner.put(partition, entry).await
    }
    async fn delete_entry(&self, partition: &str, key: &RequestKey) -> Result<bool> {
        self.hit();
        self.inner.delete_entry(partition, key).await
    }
    async fn delete(&self, partition: &str) -> Result<bool> {
        self.hit();
        self.inner.delete(partition).await
    }
    async fn keys(&self) -> Result<Vec<String>> {
        self.hit();
        self.inner.keys().await
    }
    async fn entry_keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        self.hit();
        self.inner.entry_keys(partition).await
    }
}

pub struct Harness {
    pub host: WorkerHost,
    pub store: MemoryStore,
    pub queue: MemoryQueue,
    pub fetcher: ScriptedFetcher,
}

impl Harness {
    pub fn new(version: &str) -> Self {
        Self::with_parts(version, MemoryStore::new(), ScriptedFetcher::new())
    }

    pub fn with_parts(version: &str, store: MemoryStore, fetcher: ScriptedFetcher) -> Self {
        let queue = MemoryQueue::new();
        let queue_handle: Arc<dyn PendingStore> = Arc::new(queue.clone());
        let worker = Worker::new(
            config(version),
            Arc::new(store.clone()),
            queue_handle,
            Arc::new(fetcher.clone()),
        )
        .unwrap();

        Self {
            host: WorkerHost::new(Arc::new(worker)),
            store,
            queue,
            fetcher,
        }
    }

    pub fn worker(&self) -> &Worker {
        self.host.worker()
    }
}
