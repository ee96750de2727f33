//! Harbor background sync.
//!
//! This module provides the deferred-mutation side of the worker:
//! - Pending operations recorded by the foreground application
//! - Durable queue storage that survives worker restarts
//! - Replay engine that removes only confirmed deliveries
//! - Trigger scheduler that reschedules failed batches with backoff

pub mod engine;
pub mod file_queue;
pub mod operation;
pub mod queue;
pub mod retry;
pub mod scheduler;

// Re-export main types
pub use engine::{SyncEngine, SyncReport};
pub use file_queue::FileQueue;
pub use operation::PendingOperation;
pub use queue::{MemoryQueue, PendingStore};
pub use retry::RetryConfig;
pub use scheduler::{SyncScheduler, SyncSchedulerHandle, SyncTrigger, DEFAULT_SYNC_TAG};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _retry_config = RetryConfig::default();
        let _queue = MemoryQueue::new();
        assert_eq!(DEFAULT_SYNC_TAG, "sync-pending-updates");
    }
}
