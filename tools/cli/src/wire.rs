//! Line format for `harbor run`.
//!
//! One JSON object per line, tagged by `event`:
//!
//! ```text
//! {"event":"install"}
//! {"event":"fetch","request":{"method":"GET","url":"https://app.example/","mode":"navigate"}}
//! {"event":"message","message":{"type":"CACHE_URLS","payload":["/a"]}}
//! {"event":"sync"}
//! {"event":"online"}
//! ```
//!
//! `sync` runs a replay directly; `online` goes through the scheduler and is
//! rescheduled on failure.

use anyhow::Result;
use serde::Deserialize;

use harbor_common::Request;
use harbor_worker::{ControlEnvelope, ControlOutcome, Event, EventOutcome, FetchDisposition};

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WireEvent {
    Install,
    Activate,
    Fetch { request: Request },
    Message { message: ControlEnvelope },
    Sync { tag: Option<String> },
    Online { tag: Option<String> },
}

impl WireEvent {
    /// Convert to a host event. `online` has no host counterpart.
    pub fn into_event(self, default_tag: &str) -> Result<Event> {
        Ok(match self {
            WireEvent::Install => Event::Install,
            WireEvent::Activate => Event::Activate,
            WireEvent::Fetch { request } => Event::Fetch(request),
            WireEvent::Message { message } => Event::Message(message),
            WireEvent::Sync { tag } => Event::Sync {
                tag: tag.unwrap_or_else(|| default_tag.to_string()),
            },
            WireEvent::Online { .. } => anyhow::bail!("'online' is handled by the scheduler"),
        })
    }
}

/// One-line summary of an outcome.
pub fn describe(outcome: &EventOutcome) -> String {
    match outcome {
        EventOutcome::Installed(report) => format!(
            "installed {}: {} cached, {} failed",
            report.version,
            report.cached.len(),
            report.failed.len()
        ),
        EventOutcome::Activated(report) => format!(
            "activated: {} deleted, {} kept, {} failed",
            report.deleted.len(),
            report.kept.len(),
            report.failed.len()
        ),
        EventOutcome::Fetch(FetchDisposition::Respond(response)) => format!(
            "{} {} ({:?}, {} bytes)",
            response.status,
            response.status_text,
            response.source,
            response.body.len()
        ),
        EventOutcome::Fetch(FetchDisposition::PassThrough) => "passed through".to_string(),
        EventOutcome::Message(outcome) => match outcome {
            ControlOutcome::Activated { version, report } => format!(
                "activated {} ({} partitions deleted)",
                version,
                report.deleted.len()
            ),
            ControlOutcome::NothingWaiting => "nothing waiting".to_string(),
            ControlOutcome::Cleared(report) => format!(
                "cleared {} partitions ({} failed)",
                report.deleted.len(),
                report.failed.len()
            ),
            ControlOutcome::Cached { cached, failed } => {
                format!("cached {} urls ({} failed)", cached.len(), failed.len())
            }
            ControlOutcome::Ignored { reason } => format!("ignored: {}", reason),
        },
        EventOutcome::Sync(Some(report)) => format!(
            "synced {}, failed {}, remaining {} in {:?}",
            report.replayed, report.failed, report.remaining, report.duration
        ),
        EventOutcome::Sync(None) => "sync tag ignored".to_string(),
        EventOutcome::Unhandled(kind) => format!("no handler for {}", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_common::Method;

    const TAG: &str = "sync-pending-updates";

    #[test]
    fn test_parse_fetch_line() {
        let line = r#"{"event":"fetch","request":{"method":"POST","url":"https://app.example/api"}}"#;
        let event = serde_json::from_str::<WireEvent>(line).unwrap().into_event(TAG).unwrap();
        match event {
            Event::Fetch(request) => {
                assert_eq!(request.method, Method::Post);
                assert!(!request.is_navigation());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_sync_defaults_tag() {
        let event = serde_json::from_str::<WireEvent>(r#"{"event":"sync"}"#)
            .unwrap()
            .into_event(TAG)
            .unwrap();
        assert!(matches!(event, Event::Sync { ref tag } if tag == "sync-pending-updates"));
    }

    #[test]
    fn test_online_is_not_a_host_event() {
        let event = serde_json::from_str::<WireEvent>(r#"{"event":"online"}"#).unwrap();
        assert!(event.into_event(TAG).is_err());
    }
}
