//! Pending-operation store trait and in-memory queue.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use harbor_common::{Error, Result};

use crate::operation::PendingOperation;

/// Durable storage for pending operations.
///
/// The queue is a by-id map: `enqueue` inserts or fully replaces, `update`
/// replaces only an entry that is still present, `remove` deletes.
/// Implementations must survive worker restarts unless they say otherwise.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Insert or replace an operation.
    async fn enqueue(&self, op: PendingOperation) -> Result<()>;

    /// All pending operations, oldest first.
    ///
    /// # Errors
    /// - `Error::Storage` when the backing store is unreachable
    async fn list(&self) -> Result<Vec<PendingOperation>>;

    /// Replace an operation if it is still queued. Returns whether it was.
    async fn update(&self, op: PendingOperation) -> Result<bool>;

    /// Remove an operation. Returns whether it existed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// Sort operations oldest first, ties broken by id.
pub(crate) fn sort_oldest_first(ops: &mut [PendingOperation]) {
    ops.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// In-memory queue.
///
/// Not durable: useful for tests and for hosts that provide their own
/// persistence around it. Clones share the same queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    ops: Arc<Mutex<HashMap<String, PendingOperation>>>,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, PendingOperation>>> {
        self.ops
            .lock()
            .map_err(|_| Error::Storage("Memory queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl PendingStore for MemoryQueue {
    async fn enqueue(&self, op: PendingOperation) -> Result<()> {
        self.lock()?.insert(op.id.clone(), op);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingOperation>> {
        let mut ops: Vec<PendingOperation> = self.lock()?.values().cloned().collect();
        sort_oldest_first(&mut ops);
        Ok(ops)
    }

    async fn update(&self, op: PendingOperation) -> Result<bool> {
        let mut ops = self.lock()?;
        match ops.get_mut(&op.id) {
            Some(existing) => {
                *existing = op;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.remove(id).is_some())
    }
}
