//! `db` crate — pure persistence layer.
//!
//! Provides a transactional in-memory pool, typed row structs, and repository
//! functions for every table in the dagrun schema.  No business logic lives here.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use pool::{DbPool, Transaction};
pub use error::DbError;
