//! Deferred worker-callback waits.
//!
//! A dispatcher that hands a task to a worker may register a wait for the
//! pair `(worker_id, business_id)`.  The wait resolves exactly once: when
//! the task succeeds or fails, or when someone terminates it.  Later
//! resolutions of the same key find nothing and are no-ops.  A wait that
//! is dropped or times out unregisters itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::QueueError;

/// How a wait was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Succeeded,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WaitKey {
    pub worker_id: String,
    pub business_id: String,
}

impl WaitKey {
    pub fn new(worker_id: impl Into<String>, business_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            business_id: business_id.into(),
        }
    }
}

type PendingMap = HashMap<WaitKey, oneshot::Sender<WaitOutcome>>;

/// Registry of outstanding waits.
#[derive(Debug, Default)]
pub struct DeferredResults {
    pending: Arc<Mutex<PendingMap>>,
}

/// The waiting side of one registration.
#[derive(Debug)]
pub struct DeferredWait {
    key: WaitKey,
    rx: oneshot::Receiver<WaitOutcome>,
    pending: Arc<Mutex<PendingMap>>,
}

impl DeferredResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait.  A previous registration for the same key is
    /// superseded and its waiter sees [`QueueError::Superseded`].
    pub fn register(&self, key: WaitKey) -> DeferredWait {
        let (tx, rx) = oneshot::channel();
        let previous = self.lock().insert(key.clone(), tx);
        if previous.is_some() {
            debug!(worker_id = %key.worker_id, business_id = %key.business_id, "superseding deferred wait");
        }
        DeferredWait {
            key,
            rx,
            pending: Arc::clone(&self.pending),
        }
    }

    /// Resolve the wait for `key`.  Returns `false` when nothing was
    /// pending (never registered, or already resolved).
    pub fn resolve(&self, key: &WaitKey, outcome: WaitOutcome) -> bool {
        let Some(tx) = self.lock().remove(key) else {
            return false;
        };
        info!(
            worker_id = %key.worker_id,
            business_id = %key.business_id,
            ?outcome,
            "resolving deferred wait"
        );
        // The waiter may have given up already; the resolution still counts.
        let _ = tx.send(outcome);
        true
    }

    /// Resolve with [`WaitOutcome::Terminated`].
    pub fn terminate(&self, key: &WaitKey) -> bool {
        self.resolve(key, WaitOutcome::Terminated)
    }

    pub fn is_pending(&self, key: &WaitKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        lock_pending(&self.pending)
    }
}

fn lock_pending(pending: &Mutex<PendingMap>) -> MutexGuard<'_, PendingMap> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeferredWait {
    pub fn key(&self) -> &WaitKey {
        &self.key
    }

    /// Wait for the resolution, giving up after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<WaitOutcome, QueueError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(QueueError::Superseded),
            Err(_) => Err(QueueError::TimedOut(timeout)),
        }
    }
}

impl Drop for DeferredWait {
    fn drop(&mut self) {
        // Only the entry whose receiver is this one; a newer registration
        // for the same key still has a live receiver.
        self.rx.close();
        let mut pending = lock_pending(&self.pending);
        if pending.get(&self.key).is_some_and(oneshot::Sender::is_closed) {
            pending.remove(&self.key);
            debug!(worker_id = %self.key.worker_id, business_id = %self.key.business_id, "deferred wait abandoned");
        }
    }
}
