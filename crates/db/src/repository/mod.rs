//! Repository functions — one function per storage operation.
//!
//! Every function takes a [`Transaction`](crate::Transaction) and returns a
//! `Result<T, DbError>`.  No business logic, no domain types — pure rows.

pub mod workflows;
pub mod workflow_instances;
pub mod task_instances;
pub mod instance_parameters;
pub mod parameters;
pub mod trigger_events;
