//! Scripted fetcher for testing and offline simulation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use harbor_common::{Error, Request, Response, ResponseSource, Result};

use crate::fetcher::Fetcher;

/// What the fetcher does for a scripted URL.
#[derive(Debug, Clone)]
enum Script {
    Respond(Response),
    Fail(String),
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<String, Script>,
    offline: bool,
    log: Vec<Request>,
}

/// In-memory fetcher with per-URL scripted outcomes.
///
/// Unscripted URLs fail with a network error, as does every URL while the
/// fetcher is offline. Every call is recorded, successful or not.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedFetcher {
    /// Create a fetcher with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `url` with `response`.
    pub fn respond(&self, url: &str, response: Response) -> &Self {
        self.lock()
            .scripts
            .insert(url.to_string(), Script::Respond(response));
        self
    }

    /// Answer `url` with a 200 carrying `body`.
    pub fn respond_ok(&self, url: &str, body: &str) -> &Self {
        self.respond(url, Response::new(200, body))
    }

    /// Fail `url` with a network error.
    pub fn fail(&self, url: &str, reason: &str) -> &Self {
        self.lock()
            .scripts
            .insert(url.to_string(), Script::Fail(reason.to_string()));
        self
    }

    /// Take the whole network down, or bring it back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of fetches attempted for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    /// Number of fetches attempted overall.
    pub fn total_calls(&self) -> usize {
        self.lock().log.len()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().log.clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut inner = self.lock();
        inner.log.push(request.clone());

        if inner.offline {
            return Err(Error::Network(format!("Offline: {}", request.url)));
        }

        match inner.scripts.get(request.url.as_str()) {
            Some(Script::Respond(response)) => {
                Ok(response.clone().with_source(ResponseSource::Network))
            }
            Some(Script::Fail(reason)) => Err(Error::Network(reason.clone())),
            None => Err(Error::Network(format!("No route to {}", request.url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_scripted_response() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond_ok("https://app.example/a", "alpha");

        let response = fetcher.fetch(&get("https://app.example/a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "alpha");
        assert_eq!(fetcher.calls("https://app.example/a"), 1);
    }

    #[tokio::test]
    async fn test_unscripted_url_fails() {
        let fetcher = ScriptedFetcher::new();
        let err = fetcher.fetch(&get("https://app.example/missing")).await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(fetcher.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_overrides_scripts() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond_ok("https://app.example/a", "alpha");
        fetcher.set_offline(true);

        assert!(fetcher.fetch(&get("https://app.example/a")).await.is_err());

        fetcher.set_offline(false);
        assert!(fetcher.fetch(&get("https://app.example/a")).await.is_ok());
        assert_eq!(fetcher.calls("https://app.example/a"), 2);
    }
}
