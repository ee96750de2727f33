//! Cache-first strategy for cross-origin requests.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use harbor_cache::PartitionHandle;
use harbor_common::{Request, Response};
use harbor_net::Fetcher;

use super::{lookup, store, Strategy, API_UNAVAILABLE_MESSAGE};

/// Cached copy first, network on a miss.
///
/// A hit is never revalidated: the entry stays until the partition is
/// cleared or pruned by a version bump.
pub struct CacheFirst {
    fetcher: Arc<dyn Fetcher>,
    api: PartitionHandle,
}

impl CacheFirst {
    /// Create the strategy over the external-API partition.
    pub fn new(fetcher: Arc<dyn Fetcher>, api: PartitionHandle) -> Self {
        Self { fetcher, api }
    }
}

#[async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &str {
        "cache-first"
    }

    async fn handle(&self, request: &Request) -> Response {
        if let Some(cached) = lookup(&self.api, request).await {
            debug!("Cache hit for {}", request.url);
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    store(&self.api, request, &response).await;
                }
                response
            }
            Err(e) => {
                debug!("Network failed for {}: {}", request.url, e);
                // An overlapping request may have filled the entry meanwhile.
                match lookup(&self.api, request).await {
                    Some(stale) => stale,
                    None => Response::json_error(503, API_UNAVAILABLE_MESSAGE),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_cache::{CacheNamespace, MemoryStore, Purpose};
    use harbor_common::{Error, ResponseSource, Result};
    use harbor_net::ScriptedFetcher;
    use url::Url;

    const ITEMS: &str = "https://api.example/items";

    fn setup() -> (CacheFirst, CacheNamespace, ScriptedFetcher) {
        let fetcher = ScriptedFetcher::new();
        let ns = CacheNamespace::new(Arc::new(MemoryStore::new()), "harbor", "v1").unwrap();
        let strategy = CacheFirst::new(Arc::new(fetcher.clone()), ns.handle(Purpose::ExternalApi));
        (strategy, ns, fetcher)
    }

    fn items() -> Request {
        Request::get(Url::parse(ITEMS).unwrap())
    }

    /// Fails every fetch, but only after an overlapping request has
    /// filled the cache entry.
    struct RacedFetcher {
        api: PartitionHandle,
    }

    #[async_trait]
    impl Fetcher for RacedFetcher {
        fn name(&self) -> &str {
            "raced"
        }

        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.api.put(request, &Response::new(200, "[9]")).await?;
            Err(Error::Network("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_hit_skips_network() {
        let (strategy, ns, fetcher) = setup();
        let cached = Response::new(200, r#"[1,2]"#).with_header("etag", "\"a\"");
        ns.handle(Purpose::ExternalApi).put(&items(), &cached).await.unwrap();

        let response = strategy.handle(&items()).await;
        assert_eq!(fetcher.total_calls(), 0);
        assert_eq!(response.body, cached.body);
        assert_eq!(response.headers, cached.headers);
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let (strategy, ns, fetcher) = setup();
        fetcher.respond_ok(ITEMS, "[3]");

        assert_eq!(strategy.handle(&items()).await.text(), "[3]");
        assert_eq!(strategy.handle(&items()).await.text(), "[3]");
        assert_eq!(fetcher.calls(ITEMS), 1);
        assert!(ns.handle(Purpose::ExternalApi).match_request(&items()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_error_status_not_stored() {
        let (strategy, ns, fetcher) = setup();
        fetcher.respond(ITEMS, Response::new(500, "oops"));

        assert_eq!(strategy.handle(&items()).await.status, 500);
        assert!(ns.handle(Purpose::ExternalApi).match_request(&items()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_miss_is_503() {
        let (strategy, _ns, fetcher) = setup();
        fetcher.set_offline(true);

        let response = strategy.handle(&items()).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.json().unwrap(), serde_json::json!({ "error": "API unavailable" }));
    }

    #[tokio::test]
    async fn test_network_failure_returns_entry_filled_meanwhile() {
        let ns = CacheNamespace::new(Arc::new(MemoryStore::new()), "harbor", "v1").unwrap();
        let api = ns.handle(Purpose::ExternalApi);
        let strategy = CacheFirst::new(Arc::new(RacedFetcher { api: api.clone() }), api);

        let response = strategy.handle(&items()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "[9]");
        assert_eq!(response.source, ResponseSource::Cache);
    }
}
