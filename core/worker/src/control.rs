//! Control messages from the foreground application.
//!
//! Messages arrive as a JSON envelope `{"type": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use harbor_cache::PruneReport;
use harbor_common::{Error, Result};

/// Wire form of a control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ControlEnvelope {
    /// Envelope without payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Parse an envelope from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid control message: {}", e)))
    }
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate the waiting version now.
    SkipWaiting,
    /// Delete every cache partition.
    ClearCache,
    /// Fetch and cache these URLs into the shell partition.
    CacheUrls(Vec<String>),
    /// Any other type; ignored.
    Unknown(String),
}

impl ControlMessage {
    pub const SKIP_WAITING: &'static str = "SKIP_WAITING";
    pub const CLEAR_CACHE: &'static str = "CLEAR_CACHE";
    pub const CACHE_URLS: &'static str = "CACHE_URLS";

    /// Decode an envelope.
    ///
    /// `CACHE_URLS` takes either a list of URLs or `{"urls": [...]}`.
    ///
    /// # Errors
    /// - `CACHE_URLS` payload missing or not a list of strings
    pub fn from_envelope(envelope: &ControlEnvelope) -> Result<Self> {
        match envelope.kind.as_str() {
            Self::SKIP_WAITING => Ok(ControlMessage::SkipWaiting),
            Self::CLEAR_CACHE => Ok(ControlMessage::ClearCache),
            Self::CACHE_URLS => {
                let list = match &envelope.payload {
                    Some(Value::Array(items)) => items,
                    Some(Value::Object(map)) => match map.get("urls") {
                        Some(Value::Array(items)) => items,
                        _ => return Err(malformed("expected a 'urls' list")),
                    },
                    _ => return Err(malformed("expected a list of URLs")),
                };

                list.iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| malformed("URLs must be strings"))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(ControlMessage::CacheUrls)
            }
            other => Ok(ControlMessage::Unknown(other.to_string())),
        }
    }

    /// Encode as an envelope.
    pub fn to_envelope(&self) -> ControlEnvelope {
        match self {
            ControlMessage::SkipWaiting => ControlEnvelope::new(Self::SKIP_WAITING),
            ControlMessage::ClearCache => ControlEnvelope::new(Self::CLEAR_CACHE),
            ControlMessage::CacheUrls(urls) => {
                ControlEnvelope::new(Self::CACHE_URLS).with_payload(serde_json::json!(urls))
            }
            ControlMessage::Unknown(kind) => ControlEnvelope::new(kind.clone()),
        }
    }
}

fn malformed(reason: &str) -> Error {
    Error::InvalidInput(format!("Malformed CACHE_URLS payload: {}", reason))
}

/// What handling a control message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The waiting version was activated.
    Activated { version: String, report: PruneReport },
    /// SKIP_WAITING with nothing to activate.
    NothingWaiting,
    /// Every partition was deleted, or attempted.
    Cleared(PruneReport),
    /// CACHE_URLS finished; failures are per URL.
    Cached {
        cached: Vec<String>,
        failed: Vec<(String, String)>,
    },
    /// Unknown or malformed message, or an action that could not run.
    Ignored { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(json: &str) -> Result<ControlMessage> {
        ControlMessage::from_envelope(&ControlEnvelope::from_json(json)?)
    }

    #[test]
    fn test_decode_known_types() {
        assert_eq!(decode(r#"{"type":"SKIP_WAITING"}"#).unwrap(), ControlMessage::SkipWaiting);
        assert_eq!(
            decode(r#"{"type":"CLEAR_CACHE","payload":null}"#).unwrap(),
            ControlMessage::ClearCache
        );
        assert_eq!(
            decode(r#"{"type":"CACHE_URLS","payload":["/a","/b"]}"#).unwrap(),
            ControlMessage::CacheUrls(vec!["/a".to_string(), "/b".to_string()])
        );
        assert_eq!(
            decode(r#"{"type":"CACHE_URLS","payload":{"urls":["/c"]}}"#).unwrap(),
            ControlMessage::CacheUrls(vec!["/c".to_string()])
        );
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            decode(r#"{"type":"PING","payload":1}"#).unwrap(),
            ControlMessage::Unknown("PING".to_string())
        );
    }

    #[test]
    fn test_malformed_cache_urls() {
        for payload in [json!(null), json!("/a"), json!([1, 2]), json!({ "urls": "/a" })] {
            let envelope = ControlEnvelope::new("CACHE_URLS").with_payload(payload);
            assert!(matches!(
                ControlMessage::from_envelope(&envelope),
                Err(Error::InvalidInput(_))
            ));
        }
        assert!(decode("{not json").is_err());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let message = ControlMessage::CacheUrls(vec!["/a".to_string()]);
        let json = serde_json::to_string(&message.to_envelope()).unwrap();
        assert_eq!(json, r#"{"type":"CACHE_URLS","payload":["/a"]}"#);
        assert_eq!(decode(&json).unwrap(), message);
    }
}
