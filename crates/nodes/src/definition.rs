//! Node-type definitions and their parameter schema.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CatalogError;

/// Node type of the synthetic task that opens a workflow instance.
pub const START_NODE_TYPE: &str = "start";
/// Node type of the synthetic task that cleans a workflow instance up.
pub const END_NODE_TYPE: &str = "end";

/// One formal parameter of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeParameter {
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Parameter type name (`STRING`, `NUMBER`, `BOOL`, `SECRET`).
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    /// Stored default value, used when the DSL does not supply one.
    /// Only meaningful for inputs.
    #[serde(default, rename = "parameterId", skip_serializing_if = "Option::is_none")]
    pub parameter_id: Option<String>,
}

/// Metadata and parameter schema of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator_name: Option<String>,
    #[serde(default)]
    pub creator_ref: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub owner_ref: Option<String>,
    #[serde(default)]
    pub owner_type: Option<String>,
    #[serde(default)]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub document_link: Option<String>,
    #[serde(default)]
    pub source_link: Option<String>,
    #[serde(default)]
    pub input_parameters: Vec<NodeParameter>,
    #[serde(default)]
    pub output_parameters: Vec<NodeParameter>,
}

impl NodeDef {
    /// Definition of a `start`/`end` volume type: no parameters, no worker.
    pub fn volume(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_owned(),
            name: node_type.to_owned(),
            ..Self::default()
        }
    }

    /// The declared input with the given ref.
    pub fn input(&self, ref_name: &str) -> Option<&NodeParameter> {
        self.input_parameters.iter().find(|p| p.ref_name == ref_name)
    }

    pub fn declares_outputs(&self) -> bool {
        !self.output_parameters.is_empty()
    }

    /// Declared outputs present in a worker result document.
    ///
    /// A key that is absent, or present with `null`, counts as not produced.
    pub fn matched_output_parameters(&self, document: &Map<String, Value>) -> Vec<&NodeParameter> {
        self.output_parameters
            .iter()
            .filter(|p| document.get(&p.ref_name).is_some_and(|v| !v.is_null()))
            .collect()
    }

    /// Reject definitions that declare a parameter ref twice.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for params in [&self.input_parameters, &self.output_parameters] {
            let mut seen = HashSet::new();
            for p in params {
                if !seen.insert(p.ref_name.as_str()) {
                    return Err(CatalogError::DuplicateParameter {
                        node_type: self.node_type.clone(),
                        ref_name: p.ref_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
