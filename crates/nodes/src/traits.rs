//! The `NodeDefApi` trait — how the engine reaches the node catalog.

use async_trait::async_trait;

use crate::{CatalogError, NodeDef};

/// Read access to node-type definitions.
///
/// Implementations may be backed by a remote hub; the engine only ever
/// asks for one type at a time.
#[async_trait]
pub trait NodeDefApi: Send + Sync {
    /// Fetch the definition registered for `node_type`.
    async fn get_by_type(&self, node_type: &str) -> Result<NodeDef, CatalogError>;
}
