//! Dispatch channel: the engine sends, an external dispatcher receives.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::QueueError;

/// Sending half, owned by the engine.
#[derive(Debug)]
pub struct DispatchSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for DispatchSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// Receiving half, owned by the dispatcher.
pub type DispatchReceiver<T> = mpsc::Receiver<T>;

/// Create a bounded dispatch channel holding up to `buffer` items.
pub fn dispatch_channel<T>(buffer: usize) -> (DispatchSender<T>, DispatchReceiver<T>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (DispatchSender { tx }, rx)
}

/// A reserved slot in the dispatch channel.  Sending through it cannot
/// fail; dropping it releases the slot.
#[derive(Debug)]
pub struct DispatchPermit<'a, T> {
    permit: mpsc::Permit<'a, T>,
}

impl<T> DispatchPermit<'_, T> {
    pub fn send(self, item: T) {
        self.permit.send(item);
    }
}

impl<T> DispatchSender<T> {
    /// Send without waiting.
    pub fn send(&self, item: T) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| {
            warn!("dispatch failed: {e}");
            match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::DispatchClosed,
            }
        })
    }

    /// Reserve a slot without waiting, so a caller can make delivery part
    /// of a larger all-or-nothing step.
    pub fn reserve(&self) -> Result<DispatchPermit<'_, T>, QueueError> {
        match self.tx.try_reserve() {
            Ok(permit) => Ok(DispatchPermit { permit }),
            Err(TrySendError::Full(())) => Err(QueueError::Full),
            Err(TrySendError::Closed(())) => Err(QueueError::DispatchClosed),
        }
    }
}
