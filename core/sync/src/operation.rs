//! Deferred mutating requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use harbor_common::{Error, Headers, Method, Request, Result};

/// A mutating request deferred because the network was unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Unique ID for this operation.
    pub id: String,
    /// Target URL.
    pub url: Url,
    /// Request method (never GET/HEAD/OPTIONS).
    pub method: Method,
    /// Headers sent with the replay, in addition to the JSON content type.
    #[serde(default)]
    pub headers: Headers,
    /// JSON payload.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// When the foreground application recorded the operation.
    pub created_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl PendingOperation {
    /// Record a new pending operation.
    ///
    /// # Errors
    /// - `method` is not a mutating method
    pub fn new(method: Method, url: Url, body: Option<serde_json::Value>) -> Result<Self> {
        if matches!(method, Method::Get | Method::Head | Method::Options) {
            return Err(Error::InvalidInput(format!(
                "{} is not a mutating method",
                method
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            url,
            method,
            headers: Headers::new(),
            body,
            created_at: Utc::now(),
            attempts: 0,
        })
    }

    /// Add a header; the name is lower-cased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Build the request fired on replay.
    pub fn to_request(&self) -> Result<Request> {
        let mut request = Request::new(self.method.clone(), self.url.clone());
        request.headers = self.headers.clone();
        request
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        if let Some(body) = &self.body {
            request.body = Some(serde_json::to_vec(body)?);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_rejects_read_methods() {
        assert!(PendingOperation::new(Method::Get, url("https://api.example/x"), None).is_err());
        assert!(PendingOperation::new(Method::Head, url("https://api.example/x"), None).is_err());
        assert!(PendingOperation::new(Method::Post, url("https://api.example/x"), None).is_ok());
    }

    #[test]
    fn test_to_request() {
        let op = PendingOperation::new(
            Method::Put,
            url("https://api.example/devices/1"),
            Some(serde_json::json!({ "on": true })),
        )
        .unwrap()
        .with_header("Authorization", "Bearer t");

        let request = op.to_request().unwrap();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.url.as_str(), "https://api.example/devices/1");
        assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer t");
        let body: serde_json::Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "on": true }));
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let op = PendingOperation::new(Method::Delete, url("https://api.example/x"), None).unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["method"], "DELETE");
        assert_eq!(json["attempts"], 0);
    }
}
