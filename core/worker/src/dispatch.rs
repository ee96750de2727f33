//! Event dispatch table.
//!
//! Each event kind maps to a handler that returns a [`WaitUntil`] future.
//! The event is only finished once that future has been driven to
//! completion; dropping it cancels the work.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use harbor_cache::PruneReport;
use harbor_common::{Error, Request, Result};
use harbor_sync::SyncReport;

use crate::control::{ControlEnvelope, ControlOutcome};
use crate::worker::{FetchDisposition, InstallReport, Worker};

/// Kinds of events a worker handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Message,
    Sync,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Message => "message",
            EventKind::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// An event delivered to the worker.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Message(ControlEnvelope),
    Sync { tag: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::Activate => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Message(_) => EventKind::Message,
            Event::Sync { .. } => EventKind::Sync,
        }
    }
}

/// What handling an event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(PruneReport),
    Fetch(FetchDisposition),
    Message(ControlOutcome),
    /// `None` when the tag belongs to someone else.
    Sync(Option<SyncReport>),
    /// No handler is registered for the event kind.
    Unhandled(EventKind),
}

/// Work an event handler asks the host to finish.
pub type WaitUntil = BoxFuture<'static, Result<EventOutcome>>;

/// An event handler.
pub type Handler = Arc<dyn Fn(Arc<Worker>, Event) -> WaitUntil + Send + Sync>;

/// Maps event kinds to handlers.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<EventKind, Handler>,
}

impl DispatchTable {
    /// Table with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table wiring every event kind to the worker's own handler.
    pub fn for_worker() -> Self {
        let mut table = Self::new();

        table.on(EventKind::Install, |worker, _event| {
            async move { worker.install().await.map(EventOutcome::Installed) }.boxed()
        });

        table.on(EventKind::Activate, |worker, _event| {
            async move { worker.activate().await.map(EventOutcome::Activated) }.boxed()
        });

        table.on(EventKind::Fetch, |worker, event| {
            async move {
                match event {
                    Event::Fetch(request) => {
                        Ok::<_, Error>(EventOutcome::Fetch(worker.handle_fetch(&request).await))
                    }
                    other => Ok(EventOutcome::Unhandled(other.kind())),
                }
            }
            .boxed()
        });

        table.on(EventKind::Message, |worker, event| {
            async move {
                match event {
                    Event::Message(envelope) => {
                        worker.handle_envelope(&envelope).await.map(EventOutcome::Message)
                    }
                    other => Ok(EventOutcome::Unhandled(other.kind())),
                }
            }
            .boxed()
        });

        table.on(EventKind::Sync, |worker, event| {
            async move {
                match event {
                    Event::Sync { tag } => worker.handle_sync(&tag).await.map(EventOutcome::Sync),
                    other => Ok(EventOutcome::Unhandled(other.kind())),
                }
            }
            .boxed()
        });

        table
    }

    /// Register or replace the handler for a kind.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: Fn(Arc<Worker>, Event) -> WaitUntil + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Start handling an event.
    #[must_use = "the event is only handled once the returned future completes"]
    pub fn dispatch(&self, worker: Arc<Worker>, event: Event) -> WaitUntil {
        let kind = event.kind();
        match self.handlers.get(&kind) {
            Some(handler) => {
                debug!("Dispatching {} event", kind);
                handler(worker, event)
            }
            None => {
                debug!("No handler for {} event", kind);
                async move { Ok::<_, Error>(EventOutcome::Unhandled(kind)) }.boxed()
            }
        }
    }
}
