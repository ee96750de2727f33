//! Sync trigger scheduling.
//!
//! Stands in for the platform's background-sync service: tags are
//! registered up front, a connectivity-restored signal triggers a tag, and a
//! sync function that fails is re-triggered later with backoff.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use harbor_common::{Error, Result};

use crate::retry::RetryConfig;

/// Tag the worker registers for replaying pending operations.
pub const DEFAULT_SYNC_TAG: &str = "sync-pending-updates";

/// A delivery of a sync tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTrigger {
    /// Registered tag being delivered.
    pub tag: String,
    /// 0 for a fresh signal, n for the n-th reschedule.
    pub attempt: u32,
}

#[derive(Debug)]
enum SchedulerMessage {
    Trigger(SyncTrigger),
    Shutdown,
}

/// Front end used to register tags and deliver signals.
pub struct SyncScheduler {
    registered: Arc<RwLock<BTreeSet<String>>>,
    message_tx: mpsc::Sender<SchedulerMessage>,
}

impl SyncScheduler {
    /// Create a new scheduler with the given reschedule policy.
    pub fn new(retry: RetryConfig) -> (Self, SyncSchedulerHandle) {
        let (message_tx, message_rx) = mpsc::channel(100);

        let scheduler = Self {
            registered: Arc::new(RwLock::new(BTreeSet::new())),
            message_tx,
        };

        let handle = SyncSchedulerHandle {
            message_rx,
            retry,
        };

        (scheduler, handle)
    }

    /// Register a tag so that signals for it are delivered.
    pub async fn register(&self, tag: impl Into<String>) {
        let tag = tag.into();
        debug!("Registered sync tag: {}", tag);
        self.registered.write().await.insert(tag);
    }

    /// Check whether a tag is registered.
    pub async fn is_registered(&self, tag: &str) -> bool {
        self.registered.read().await.contains(tag)
    }

    /// Deliver a connectivity-restored signal for `tag`.
    ///
    /// # Returns
    /// `false` if the tag was never registered; nothing is delivered then.
    ///
    /// # Errors
    /// - The scheduler task is not running
    pub async fn trigger(&self, tag: &str) -> Result<bool> {
        if !self.is_registered(tag).await {
            warn!("Ignoring signal for unregistered sync tag: {}", tag);
            return Ok(false);
        }

        self.message_tx
            .send(SchedulerMessage::Trigger(SyncTrigger {
                tag: tag.to_string(),
                attempt: 0,
            }))
            .await
            .map_err(|_| Error::InvalidInput("Sync scheduler not running".to_string()))?;
        Ok(true)
    }

    /// Shutdown the scheduler task. Pending reschedules are dropped.
    pub async fn shutdown(&self) {
        let _ = self.message_tx.send(SchedulerMessage::Shutdown).await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    message_rx: mpsc::Receiver<SchedulerMessage>,
    retry: RetryConfig,
}

impl SyncSchedulerHandle {
    /// Run the scheduler background task.
    ///
    /// This should be spawned in a tokio task. `sync_fn` is awaited to
    /// completion for every delivery, one delivery at a time. When it
    /// returns an error the same tag is re-delivered after
    /// `retry.delay_for_attempt(n)`, up to `retry.max_retries` times.
    pub async fn run<F, Fut, T>(mut self, sync_fn: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut rescheduled: Vec<(Instant, SyncTrigger)> = Vec::new();

        info!("Sync scheduler started");

        loop {
            let next_due = rescheduled.iter().map(|(at, _)| *at).min();

            tokio::select! {
                message = self.message_rx.recv() => {
                    match message {
                        Some(SchedulerMessage::Trigger(trigger)) => {
                            // A fresh signal supersedes any backoff still waiting for this tag.
                            rescheduled.retain(|(_, pending)| pending.tag != trigger.tag);
                            Self::deliver(&self.retry, &sync_fn, trigger, &mut rescheduled).await;
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }

                _ = Self::wait_until(next_due) => {
                    let now = Instant::now();
                    let (due, later): (Vec<_>, Vec<_>) =
                        rescheduled.drain(..).partition(|(at, _)| *at <= now);
                    rescheduled = later;
                    for (_, trigger) in due {
                        Self::deliver(&self.retry, &sync_fn, trigger, &mut rescheduled).await;
                    }
                }
            }
        }
    }

    async fn deliver<F, Fut, T>(
        retry: &RetryConfig,
        sync_fn: &F,
        trigger: SyncTrigger,
        rescheduled: &mut Vec<(Instant, SyncTrigger)>,
    ) where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        debug!("Delivering sync '{}' (attempt {})", trigger.tag, trigger.attempt);

        match sync_fn(trigger.tag.clone()).await {
            Ok(_) => info!("Sync '{}' completed", trigger.tag),
            Err(e) if trigger.attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(trigger.attempt);
                warn!(
                    "Sync '{}' failed: {}. Rescheduling in {:?}",
                    trigger.tag, e, delay
                );
                rescheduled.push((
                    Instant::now() + delay,
                    SyncTrigger {
                        tag: trigger.tag,
                        attempt: trigger.attempt + 1,
                    },
                ));
            }
            Err(e) => {
                error!(
                    "Sync '{}' failed after {} reschedules: {}",
                    trigger.tag, trigger.attempt, e
                );
            }
        }
    }

    async fn wait_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
