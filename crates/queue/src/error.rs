//! Queue error type.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No resolution arrived before the deadline.
    #[error("worker callback wait timed out after {0:?}")]
    TimedOut(Duration),

    /// The wait was replaced by a newer registration for the same key.
    #[error("worker callback wait was superseded")]
    Superseded,

    /// The dispatch channel buffer has no free slot.
    #[error("dispatch channel is full")]
    Full,

    /// The receiving side of the dispatch channel is gone.
    #[error("dispatch channel closed")]
    DispatchClosed,
}
