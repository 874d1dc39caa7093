//! DAG validation — run this before registering or executing a workflow.
//!
//! Rules enforced:
//! 1. Node refs must be unique within the workflow and must not use the
//!    reserved volume refs (`start`, `end`) or scope names (`global`,
//!    `trigger`).
//! 2. Every dependency must reference a declared node.
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node refs on success.  Ties are
//! broken by declaration order so the result is stable.

use std::collections::{HashMap, HashSet, VecDeque};

use nodes::{END_NODE_TYPE, START_NODE_TYPE};

use crate::EngineError;
use crate::models::Node;
use crate::scope::{GLOBAL_SCOPE, TRIGGER_SCOPE};

const RESERVED_REFS: [&str; 4] = [START_NODE_TYPE, END_NODE_TYPE, GLOBAL_SCOPE, TRIGGER_SCOPE];

/// Validate the graph formed by `nodes` and return refs in execution order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share a ref.
/// - [`EngineError::ReservedNodeRef`] if a node uses a reserved ref.
/// - [`EngineError::UnknownNodeReference`] if a dependency is not declared.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(nodes: &[Node]) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node refs are unique and not reserved
    // -----------------------------------------------------------------------
    let mut seen_refs: HashSet<&str> = HashSet::new();
    for node in nodes {
        let node_ref = node.ref_name.as_str();
        if RESERVED_REFS.contains(&node_ref) {
            return Err(EngineError::ReservedNodeRef(node.ref_name.clone()));
        }
        if !seen_refs.insert(node_ref) {
            return Err(EngineError::DuplicateNodeId(node.ref_name.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate dependencies
    // -----------------------------------------------------------------------
    for node in nodes {
        if let Some(missing) = node.depends_on.iter().find(|d| !seen_refs.contains(d.as_str())) {
            return Err(EngineError::UnknownNodeReference {
                node_ref: node.ref_name.clone(),
                dependency: missing.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in nodes {
        dependents.entry(node.ref_name.as_str()).or_default();
        in_degree.insert(node.ref_name.as_str(), node.depends_on.len());
        for dependency in &node.depends_on {
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(node.ref_name.as_str());
        }
    }

    // Seed the queue with nodes that have no dependencies.
    let mut queue: VecDeque<&str> = nodes
        .iter()
        .filter(|n| n.depends_on.is_empty())
        .map(|n| n.ref_name.as_str())
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(nodes.len());

    while let Some(node_ref) = queue.pop_front() {
        sorted.push(node_ref.to_owned());

        if let Some(next) = dependents.get(node_ref) {
            for &dependent in next {
                let deg = in_degree.entry(dependent).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}
