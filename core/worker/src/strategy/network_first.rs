//! Network-first strategy for same-origin requests.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use harbor_cache::PartitionHandle;
use harbor_common::{Request, RequestKey, Response};
use harbor_net::Fetcher;

use super::{lookup, store, Strategy, OFFLINE_MESSAGE};

/// Fresh network responses first, the shell cache when offline.
///
/// Navigations that miss the shell cache fall back to the offline document.
pub struct NetworkFirst {
    fetcher: Arc<dyn Fetcher>,
    shell: PartitionHandle,
    offline: PartitionHandle,
    offline_document: RequestKey,
}

impl NetworkFirst {
    /// Create the strategy over the shell and offline partitions.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        shell: PartitionHandle,
        offline: PartitionHandle,
        offline_document: RequestKey,
    ) -> Self {
        Self {
            fetcher,
            shell,
            offline,
            offline_document,
        }
    }

    async fn offline_document(&self) -> Option<Response> {
        match self.offline.match_key(&self.offline_document).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Offline document lookup failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &str {
        "network-first"
    }

    async fn handle(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    store(&self.shell, request, &response).await;
                } else {
                    debug!("Not caching {} ({})", request.url, response.status);
                }
                return response;
            }
            Err(e) => debug!("Network failed for {}, trying cache: {}", request.url, e),
        }

        if let Some(cached) = lookup(&self.shell, request).await {
            debug!("Serving {} from {}", request.url, self.shell.name());
            return cached;
        }

        if request.is_navigation() {
            if let Some(document) = self.offline_document().await {
                debug!("Serving offline document for {}", request.url);
                return document;
            }
        }

        Response::json_error(503, OFFLINE_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_cache::{CacheNamespace, CacheStore, CachedEntry, MemoryStore, Purpose};
    use harbor_common::{Error, ResponseSource, Result};
    use harbor_net::ScriptedFetcher;
    use url::Url;

    const PAGE: &str = "https://app.example/page";
    const OFFLINE: &str = "https://app.example/offline.html";

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn strategy(store: Arc<dyn CacheStore>, fetcher: &ScriptedFetcher) -> (NetworkFirst, CacheNamespace) {
        let ns = CacheNamespace::new(store, "harbor", "v1").unwrap();
        let strategy = NetworkFirst::new(
            Arc::new(fetcher.clone()),
            ns.handle(Purpose::Shell),
            ns.handle(Purpose::OfflineFallback),
            RequestKey::get(&url(OFFLINE)),
        );
        (strategy, ns)
    }

    /// Store where every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn open(&self, _partition: &str) -> Result<()> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn has(&self, _partition: &str) -> Result<bool> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn match_entry(&self, _partition: &str, _key: &RequestKey) -> Result<Option<CachedEntry>> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn put(&self, _partition: &str, _entry: CachedEntry) -> Result<()> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn delete_entry(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn delete(&self, _partition: &str) -> Result<bool> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
        async fn entry_keys(&self, _partition: &str) -> Result<Vec<RequestKey>> {
            Err(Error::Storage("quota exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn test_success_is_returned_and_cached() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond_ok(PAGE, "fresh");
        let (strategy, ns) = strategy(Arc::new(MemoryStore::new()), &fetcher);

        let request = Request::get(url(PAGE));
        let response = strategy.handle(&request).await;
        assert_eq!(response.text(), "fresh");
        assert_eq!(response.source, ResponseSource::Network);

        let cached = ns.handle(Purpose::Shell).match_request(&request).await.unwrap().unwrap();
        assert_eq!(cached.body, b"fresh");
    }

    #[tokio::test]
    async fn test_error_status_not_cached() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond(PAGE, Response::new(404, "missing"));
        let (strategy, ns) = strategy(Arc::new(MemoryStore::new()), &fetcher);

        let request = Request::get(url(PAGE));
        assert_eq!(strategy.handle(&request).await.status, 404);
        assert!(ns.handle(Purpose::Shell).match_request(&request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_serves_cached_copy() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond_ok(PAGE, "v1 page");
        let (strategy, _ns) = strategy(Arc::new(MemoryStore::new()), &fetcher);

        let request = Request::get(url(PAGE));
        strategy.handle(&request).await;

        fetcher.set_offline(true);
        let response = strategy.handle(&request).await;
        assert_eq!(response.text(), "v1 page");
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_document() {
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);
        let (strategy, ns) = strategy(Arc::new(MemoryStore::new()), &fetcher);

        ns.handle(Purpose::OfflineFallback)
            .put(&Request::get(url(OFFLINE)), &Response::new(200, "<h1>offline</h1>"))
            .await
            .unwrap();

        let response = strategy.handle(&Request::navigate(url(PAGE))).await;
        assert_eq!(response.text(), "<h1>offline</h1>");

        // Subresources never get the offline document.
        let response = strategy.handle(&Request::get(url(PAGE))).await;
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_offline_without_document_is_503() {
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);
        let (strategy, _ns) = strategy(Arc::new(MemoryStore::new()), &fetcher);

        let response = strategy.handle(&Request::navigate(url(PAGE))).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Synthesized);
        assert_eq!(response.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(
            response.json().unwrap(),
            serde_json::json!({ "error": "Offline: Unable to load resource" })
        );
    }

    #[tokio::test]
    async fn test_storage_failure_never_reaches_caller() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond_ok(PAGE, "fresh");
        let (strategy, _ns) = strategy(Arc::new(BrokenStore), &fetcher);

        let request = Request::navigate(url(PAGE));
        assert_eq!(strategy.handle(&request).await.text(), "fresh");

        fetcher.set_offline(true);
        assert_eq!(strategy.handle(&request).await.status, 503);
    }
}
