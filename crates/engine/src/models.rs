//! Workflow definition model.
//!
//! [`WorkflowDefinition`] is the plain serialisable form produced by the DSL
//! parser and stored in the `definition` column of the `workflows` table.
//! [`Workflow`] is the validated, immutable aggregate built from it; a new
//! version is a new object, never a mutation.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use nodes::{END_NODE_TYPE, START_NODE_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use db::models::WorkflowRow;

use crate::EngineError;
use crate::dag::validate_dag;
use crate::expression::ExpressionLanguage;
use crate::parameter::{Parameter, ParameterType};
use crate::scope::ScopeContext;

// ---------------------------------------------------------------------------
// WorkflowType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    #[default]
    Flow,
    Pipeline,
}

impl WorkflowType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Flow => "FLOW",
            Self::Pipeline => "PIPELINE",
        }
    }
}

impl FromStr for WorkflowType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FLOW" => Ok(Self::Flow),
            "PIPELINE" => Ok(Self::Pipeline),
            other => Err(EngineError::UnknownValue {
                kind: "workflow type",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One declared input of a node: the target ref, its type, and the
/// expression that computes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub expression: String,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique ref within this workflow (referenced by `depends_on`).
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// Node type, looked up in the node catalog.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    /// Refs of the nodes that must succeed before this one runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Node {
    fn volume(node_type: &str) -> Self {
        Self {
            ref_name: node_type.to_owned(),
            node_type: node_type.to_owned(),
            name: Some(node_type.to_owned()),
            inputs: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn is_volume(&self) -> bool {
        self.node_type == START_NODE_TYPE || self.node_type == END_NODE_TYPE
    }
}

// ---------------------------------------------------------------------------
// Global parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: Value,
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// The unvalidated, serialisable form of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[serde(rename = "ref")]
    pub workflow_ref: String,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub workflow_type: WorkflowType,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub global_parameters: Vec<GlobalParameter>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A validated workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorkflowDefinition", into = "WorkflowDefinition")]
pub struct Workflow {
    definition: WorkflowDefinition,
    order: Vec<String>,
    start: Node,
    end: Node,
}

impl TryFrom<WorkflowDefinition> for Workflow {
    type Error = EngineError;

    fn try_from(definition: WorkflowDefinition) -> Result<Self, Self::Error> {
        let order = validate_dag(&definition.nodes)?;
        for node in &definition.nodes {
            for input in &node.inputs {
                ParameterType::from_name(&input.type_name)?;
            }
        }
        for global in &definition.global_parameters {
            ParameterType::from_name(&global.type_name)?.new_parameter(&global.value)?;
        }
        Ok(Self {
            definition,
            order,
            start: Node::volume(START_NODE_TYPE),
            end: Node::volume(END_NODE_TYPE),
        })
    }
}

impl From<Workflow> for WorkflowDefinition {
    fn from(workflow: Workflow) -> Self {
        workflow.definition
    }
}

impl Workflow {
    pub fn workflow_ref(&self) -> &str {
        &self.definition.workflow_ref
    }

    pub fn version(&self) -> &str {
        &self.definition.version
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> Option<&str> {
        self.definition.description.as_deref()
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.definition.workflow_type
    }

    /// Declared nodes, in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.definition.nodes
    }

    pub fn global_parameters(&self) -> &[GlobalParameter] {
        &self.definition.global_parameters
    }

    /// Declared node refs in a valid execution order.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Nodes with no dependencies.
    pub fn root_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().iter().filter(|n| n.depends_on.is_empty())
    }

    /// Refs of the nodes `node_ref` depends on.  Volume nodes have none.
    pub fn predecessors(&self, node_ref: &str) -> Result<&[String], EngineError> {
        Ok(&self.find_node(node_ref)?.depends_on)
    }

    /// Locate a declared node, or the implicit `start`/`end` volume node.
    pub fn find_node(&self, node_ref: &str) -> Result<&Node, EngineError> {
        if let Some(node) = self.nodes().iter().find(|n| n.ref_name == node_ref) {
            return Ok(node);
        }
        match node_ref {
            START_NODE_TYPE => Ok(&self.start),
            END_NODE_TYPE => Ok(&self.end),
            _ => Err(EngineError::not_found("node", format!("{}/{node_ref}", self.workflow_ref()))),
        }
    }

    /// Fresh parameters for every global parameter, in declaration order.
    pub fn global_parameter_values(&self) -> Result<Vec<(String, Parameter)>, EngineError> {
        self.global_parameters()
            .iter()
            .map(|g| {
                let parameter = ParameterType::from_name(&g.type_name)?.new_parameter(&g.value)?;
                Ok((g.name.clone(), parameter))
            })
            .collect()
    }

    /// Evaluate every input expression of `node_ref` against `context`.
    ///
    /// All or nothing: the first failing input fails the whole computation.
    pub fn calculate_task_params(
        &self,
        node_ref: &str,
        expression_language: &dyn ExpressionLanguage,
        context: &ScopeContext,
    ) -> Result<HashMap<String, Parameter>, EngineError> {
        let node = self.find_node(node_ref)?;
        let mut params = HashMap::with_capacity(node.inputs.len());
        for input in &node.inputs {
            let result_type = ParameterType::from_name(&input.type_name)?;
            let parameter = expression_language
                .evaluate(&input.expression, result_type, context)
                .map_err(|e| e.for_input(&input.ref_name))?;
            params.insert(input.ref_name.clone(), parameter);
        }
        Ok(params)
    }

    pub(crate) fn to_row(&self) -> Result<WorkflowRow, EngineError> {
        Ok(WorkflowRow {
            workflow_ref: self.workflow_ref().to_owned(),
            version: self.version().to_owned(),
            name: self.name().to_owned(),
            definition: serde_json::to_value(&self.definition)?,
            created_at: Utc::now(),
        })
    }

    pub(crate) fn from_row(row: WorkflowRow) -> Result<Self, EngineError> {
        let definition: WorkflowDefinition = serde_json::from_value(row.definition)?;
        Self::try_from(definition)
    }
}
