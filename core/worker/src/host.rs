//! Event host.
//!
//! The host owns the worker and drives every dispatched event to
//! completion on its own task. Shutdown waits for all of them.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use harbor_common::{Error, Request, Response, Result};

use crate::dispatch::{DispatchTable, Event, EventOutcome};
use crate::worker::{FetchDisposition, Worker};

/// Runs events against a worker.
#[derive(Clone)]
pub struct WorkerHost {
    worker: Arc<Worker>,
    table: Arc<DispatchTable>,
    tracker: TaskTracker,
}

impl WorkerHost {
    /// Host with the worker's default handlers.
    pub fn new(worker: Arc<Worker>) -> Self {
        Self::with_table(worker, DispatchTable::for_worker())
    }

    pub fn with_table(worker: Arc<Worker>, table: DispatchTable) -> Self {
        Self {
            worker,
            table: Arc::new(table),
            tracker: TaskTracker::new(),
        }
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Spawn an event. The returned handle resolves to its outcome; the
    /// event keeps running even if the handle is dropped.
    pub fn submit(&self, event: Event) -> JoinHandle<Result<EventOutcome>> {
        let wait_until = self.table.dispatch(self.worker.clone(), event);
        self.tracker.spawn(wait_until)
    }

    /// Spawn an event and wait for its outcome.
    ///
    /// # Errors
    /// - The handler failed
    /// - The event task was aborted or panicked
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome> {
        let kind = event.kind();
        self.submit(event)
            .await
            .map_err(|e| Error::Aborted(format!("{} event did not complete: {}", kind, e)))?
    }

    /// Answer a request the way a controlled page would see it.
    ///
    /// Pass-through requests go to the fetcher untouched, so their network
    /// errors surface here.
    pub async fn respond(&self, request: Request) -> Result<Response> {
        match self.dispatch(Event::Fetch(request.clone())).await? {
            EventOutcome::Fetch(FetchDisposition::Respond(response)) => Ok(response),
            EventOutcome::Fetch(FetchDisposition::PassThrough) | EventOutcome::Unhandled(_) => {
                debug!("Forwarding {} {} to the network", request.method, request.url);
                self.worker.fetcher().fetch(&request).await
            }
            other => Err(Error::InvalidInput(format!(
                "Unexpected outcome for fetch event: {:?}",
                other
            ))),
        }
    }

    /// Number of events still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every in-flight event. Events submitted meanwhile are
    /// waited for too.
    pub async fn drain(&self) {
        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting for {} in-flight events", pending);
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
