//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("row not found")]
    NotFound,

    /// A row with the same primary key already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
}
