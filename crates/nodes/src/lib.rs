//! `nodes` crate — the node-definition catalog.
//!
//! A node definition describes a node *type*: its metadata and its formal
//! input/output parameter schema.  The engine looks definitions up through
//! the [`NodeDefApi`] port.

pub mod definition;
pub mod error;
pub mod memory;
pub mod traits;

pub use definition::{NodeDef, NodeParameter, END_NODE_TYPE, START_NODE_TYPE};
pub use error::CatalogError;
pub use memory::InMemoryCatalog;
pub use traits::NodeDefApi;
