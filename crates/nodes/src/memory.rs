//! `InMemoryCatalog` — a process-local node catalog.
//!
//! Used by the CLI and by tests.  The `start` and `end` volume types are
//! always registered.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::{CatalogError, NodeDef, NodeDefApi, END_NODE_TYPE, START_NODE_TYPE};

pub struct InMemoryCatalog {
    definitions: RwLock<HashMap<String, NodeDef>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        let definitions = [START_NODE_TYPE, END_NODE_TYPE]
            .into_iter()
            .map(|t| (t.to_owned(), NodeDef::volume(t)))
            .collect();
        Self {
            definitions: RwLock::new(definitions),
        }
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog holding every definition in `defs`.
    pub fn with_definitions(defs: impl IntoIterator<Item = NodeDef>) -> Result<Self, CatalogError> {
        let catalog = Self::new();
        for def in defs {
            catalog.register(def)?;
        }
        Ok(catalog)
    }

    /// Add or replace the definition of `def.node_type`.
    pub fn register(&self, def: NodeDef) -> Result<(), CatalogError> {
        def.validate()?;
        debug!(node_type = %def.node_type, "registering node definition");
        self.definitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(def.node_type.clone(), def);
        Ok(())
    }
}

#[async_trait]
impl NodeDefApi for InMemoryCatalog {
    async fn get_by_type(&self, node_type: &str) -> Result<NodeDef, CatalogError> {
        self.definitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(node_type)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(node_type.to_owned()))
    }
}
