//! `queue` crate — the plumbing between the engine and external workers.
//!
//! - [`dispatch`]: hands freshly activated task instances to a dispatcher.
//! - [`deferred`]: single-resolution waits on a worker callback, keyed by
//!   `(worker_id, business_id)`.
//! - [`callbacks`]: monitoring callbacks registered per trigger run and
//!   released when the run is cleaned up.

pub mod callbacks;
pub mod deferred;
pub mod dispatch;
pub mod error;

pub use callbacks::MonitoringCallbacks;
pub use deferred::{DeferredResults, DeferredWait, WaitKey, WaitOutcome};
pub use dispatch::{dispatch_channel, DispatchPermit, DispatchReceiver, DispatchSender};
pub use error::QueueError;
