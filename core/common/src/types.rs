//! Request and response model used throughout Harbor.
//!
//! These types are deliberately transport-agnostic: the router and the
//! strategies only ever see a `Request` and produce a `Response`; turning
//! them into real HTTP traffic is the job of a `Fetcher` implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Header map. Names are stored lower-cased.
pub type Headers = BTreeMap<String, String>;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    /// Any other token, kept verbatim (upper-cased).
    Other(String),
}

impl Method {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Other(name) => name,
        }
    }

    /// Whether this is a GET, the only method the caching strategies handle.
    pub fn is_get(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(crate::Error::InvalidInput(
                "HTTP method cannot be empty".to_string(),
            ));
        }
        Ok(match upper.as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            _ => Method::Other(upper),
        })
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

impl TryFrom<String> for Method {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    /// Same-origin subresource.
    SameOrigin,
    /// Cross-origin request subject to CORS.
    #[default]
    Cors,
    /// Opaque cross-origin request.
    NoCors,
}

/// Cache key for a request: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: Method,
    pub url: String,
}

impl RequestKey {
    /// Create a key from its parts.
    pub fn new(method: Method, url: &Url) -> Self {
        Self {
            method,
            url: url.as_str().to_string(),
        }
    }

    /// Key for a plain GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::Get, url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub mode: RequestMode,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
            mode: RequestMode::default(),
        }
    }

    /// Plain GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    /// GET issued by a page navigation.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    /// Set the request mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header; the name is lower-cased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Whether this request is a page navigation.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), &self.url)
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    #[default]
    Network,
    Cache,
    /// Built locally because neither network nor cache could answer.
    Synthesized,
}

/// A response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub source: ResponseSource,
}

impl Response {
    /// Create a network response with the canonical reason phrase.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Synthesized error response with body `{"error": message}`.
    pub fn json_error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status, body)
            .with_header("content-type", "application/json")
            .with_source(ResponseSource::Synthesized)
    }

    /// Add a header; the name is lower-cased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Tag the response with its source.
    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("PATCH".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(
            "purge".parse::<Method>().unwrap(),
            Method::Other("PURGE".to_string())
        );
        assert!("".parse::<Method>().is_err());
    }

    #[test]
    fn test_method_serializes_as_string() {
        let json = serde_json::to_string(&Method::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        let method: Method = serde_json::from_str("\"put\"").unwrap();
        assert_eq!(method, Method::Put);
    }

    #[test]
    fn test_request_key() {
        let request = Request::get(url("https://app.example/index.html"));
        let key = request.key();
        assert_eq!(key.method, Method::Get);
        assert_eq!(key.url, "https://app.example/index.html");
        assert_eq!(key.to_string(), "GET https://app.example/index.html");
    }

    #[test]
    fn test_request_keys_sort_by_method_then_url() {
        let mut keys = vec![
            RequestKey::new(Method::Post, &url("https://app.example/a")),
            RequestKey::new(Method::Get, &url("https://app.example/b")),
            RequestKey::new(Method::Get, &url("https://app.example/a")),
        ];
        keys.sort();
        assert_eq!(keys[0], RequestKey::new(Method::Get, &url("https://app.example/a")));
        assert_eq!(keys[1], RequestKey::new(Method::Get, &url("https://app.example/b")));
        assert_eq!(keys[2].method, Method::Post);
    }

    #[test]
    fn test_navigation_flag() {
        assert!(Request::navigate(url("https://app.example/")).is_navigation());
        assert!(!Request::get(url("https://app.example/")).is_navigation());
    }

    #[test]
    fn test_response_ok_range() {
        assert!(Response::new(200, "").ok());
        assert!(Response::new(204, "").ok());
        assert!(!Response::new(304, "").ok());
        assert!(!Response::new(503, "").ok());
    }

    #[test]
    fn test_json_error_shape() {
        let response = Response::json_error(503, "API unavailable");
        assert_eq!(response.status, 503);
        assert_eq!(response.status_text, "Service Unavailable");
        assert_eq!(response.source, ResponseSource::Synthesized);
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            response.json().unwrap(),
            serde_json::json!({ "error": "API unavailable" })
        );
    }
}
