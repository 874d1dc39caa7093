//! Catalog error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No definition is registered for the node type.
    #[error("node definition not found: '{0}'")]
    NotFound(String),

    /// A definition declares the same parameter ref twice.
    #[error("node definition '{node_type}' declares parameter '{ref_name}' more than once")]
    DuplicateParameter { node_type: String, ref_name: String },
}
