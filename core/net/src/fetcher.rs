//! Fetcher trait definition.

use async_trait::async_trait;

use harbor_common::{Request, Response, Result};

/// Capability to send a request over the network.
///
/// # Errors
/// `Error::Network` when no response was received at all. Any HTTP status,
/// including 4xx and 5xx, is a successful fetch and comes back as `Ok`.
///
/// Implementations enforce no timeout of their own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetcher name for logging (e.g., "http", "scripted").
    fn name(&self) -> &str;

    /// Send the request and return the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
