//! Caching strategies for intercepted GET requests.
//!
//! A strategy always produces a response. Network failures and storage
//! failures are absorbed here: the caller of an intercepted request only
//! ever sees a real response, a cached copy or a synthesized 503.

mod cache_first;
mod network_first;

pub use cache_first::CacheFirst;
pub use network_first::NetworkFirst;

use async_trait::async_trait;
use tracing::warn;

use harbor_cache::PartitionHandle;
use harbor_common::{Request, Response};

/// Body message of the 503 returned for same-origin requests.
pub const OFFLINE_MESSAGE: &str = "Offline: Unable to load resource";

/// Body message of the 503 returned for cross-origin requests.
pub const API_UNAVAILABLE_MESSAGE: &str = "API unavailable";

/// A caching strategy.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &str;

    /// Answer a GET request.
    async fn handle(&self, request: &Request) -> Response;
}

/// Look up a request, treating storage errors as a miss.
pub(crate) async fn lookup(partition: &PartitionHandle, request: &Request) -> Option<Response> {
    match partition.match_request(request).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!("Cache lookup in {} failed for {}: {}", partition.name(), request.url, e);
            None
        }
    }
}

/// Store a copy of a response, logging storage errors.
pub(crate) async fn store(partition: &PartitionHandle, request: &Request, response: &Response) {
    if let Err(e) = partition.put(request, response).await {
        warn!("Failed to cache {} in {}: {}", request.url, partition.name(), e);
    }
}
