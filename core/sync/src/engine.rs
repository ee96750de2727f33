//! Replay engine for pending operations.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use harbor_common::Result;
use harbor_net::Fetcher;

use crate::operation::PendingOperation;
use crate::queue::PendingStore;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations confirmed delivered and removed from the queue.
    pub replayed: usize,
    /// Operations whose replay failed and that stay queued.
    pub failed: usize,
    /// Operations left in the queue after the cycle.
    pub remaining: usize,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

/// Replays queued mutations against the network.
///
/// There is no backoff and no per-item retry inside a cycle: a failed item
/// simply stays queued for the next trigger.
pub struct SyncEngine {
    queue: Arc<dyn PendingStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl SyncEngine {
    /// Create an engine over a queue and a fetcher.
    pub fn new(queue: Arc<dyn PendingStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { queue, fetcher }
    }

    /// The queue this engine drains.
    pub fn queue(&self) -> Arc<dyn PendingStore> {
        self.queue.clone()
    }

    /// Replay every pending operation once.
    ///
    /// A 2xx response removes the operation. Anything else (non-2xx status,
    /// network failure, unencodable body) leaves it queued with its attempt
    /// count bumped, and processing moves on to the next item.
    ///
    /// # Errors
    /// - The queue cannot be listed
    /// - A delivered operation cannot be removed
    /// - The attempt count of a failed operation cannot be written
    ///
    /// Any of these aborts the cycle so the trigger source reschedules the
    /// whole batch.
    pub async fn replay_pending(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let pending = self.queue.list().await?;
        let total = pending.len();

        if total == 0 {
            debug!("No pending operations to sync");
            return Ok(SyncReport {
                duration: start.elapsed(),
                ..SyncReport::default()
            });
        }

        info!("Syncing {} pending operations", total);

        let mut replayed = 0;
        let mut failed = 0;

        for op in pending {
            match self.replay_one(&op).await {
                Ok(()) => {
                    self.queue.remove(&op.id).await?;
                    info!("Synced pending operation {} {} {}", op.id, op.method, op.url);
                    replayed += 1;
                }
                Err(reason) => {
                    warn!(
                        "Failed to sync pending operation {} {} {}: {}",
                        op.id, op.method, op.url, reason
                    );
                    failed += 1;
                    self.record_attempt(op).await?;
                }
            }
        }

        let duration = start.elapsed();
        info!(
            "Sync cycle completed in {:?}: {} replayed, {} failed",
            duration, replayed, failed
        );

        Ok(SyncReport {
            replayed,
            failed,
            remaining: total - replayed,
            duration,
        })
    }

    /// Fire one operation; `Err` carries a human-readable reason.
    async fn replay_one(&self, op: &PendingOperation) -> std::result::Result<(), String> {
        let request = op.to_request().map_err(|e| e.to_string())?;
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| e.to_string())?;

        if response.ok() {
            Ok(())
        } else {
            Err(format!("server answered {} {}", response.status, response.status_text))
        }
    }

    async fn record_attempt(&self, mut op: PendingOperation) -> Result<()> {
        op.attempts += 1;
        self.queue.update(op).await.map(|_| ())
    }
}
