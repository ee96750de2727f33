//! reqwest-backed fetcher.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::Client;
use tracing::debug;

use harbor_common::{Error, Headers, Request, Response, ResponseSource, Result};

use crate::fetcher::Fetcher;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Harbor/0.1";

/// Fetcher that performs real HTTP requests.
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given user agent.
    ///
    /// # Errors
    /// - TLS backend or client construction failure
    pub fn new(user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Wrap an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("Invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status();
        let headers = collect_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read body of {}: {}", request.url, e)))?
            .to_vec();

        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}

/// Flatten a header map, joining repeated values with `, `.
///
/// `set-cookie` values may themselves contain commas, so they are joined
/// with newlines instead. Values that are not visible ASCII are dropped.
fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for name in map.keys() {
        let separator = if *name == SET_COOKIE { "\n" } else { ", " };
        let values: Vec<&str> = map
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if !values.is_empty() {
            headers.insert(name.as_str().to_string(), values.join(separator));
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_builds() {
        let fetcher = HttpFetcher::new(DEFAULT_USER_AGENT).unwrap();
        assert_eq!(fetcher.name(), "http");
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("vary", "accept".parse().unwrap());
        map.append("vary", "origin".parse().unwrap());
        map.append(SET_COOKIE, "a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        map.append(SET_COOKIE, "b=2".parse().unwrap());
        map.append("content-type", "application/json".parse().unwrap());

        let headers = collect_headers(&map);
        assert_eq!(headers["vary"], "accept, origin");
        assert_eq!(
            headers["set-cookie"],
            "a=1; Expires=Wed, 21 Oct 2026 07:28:00 GMT\nb=2"
        );
        assert_eq!(headers["content-type"], "application/json");
    }
}
