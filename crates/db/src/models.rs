//! Row structs that map 1-to-1 onto storage tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row, keyed by `(workflow_ref, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRow {
    pub workflow_ref: String,
    pub version: String,
    pub name: String,
    /// Full JSON workflow definition (nodes, global parameters, …)
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// One triggered run of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstanceRow {
    pub id: String,
    pub trigger_id: String,
    pub workflow_ref: String,
    pub workflow_version: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// task_instances
// ---------------------------------------------------------------------------

/// One execution attempt of one DAG node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstanceRow {
    pub id: String,
    pub serial_no: i32,
    pub def_key: String,
    /// Snapshot of the node-type metadata taken at activation time.
    pub node_info: serde_json::Value,
    pub async_task_ref: String,
    pub workflow_ref: String,
    pub workflow_version: String,
    pub business_id: String,
    pub trigger_id: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
}

// ---------------------------------------------------------------------------
// instance_parameters
// ---------------------------------------------------------------------------

/// A named INPUT/OUTPUT binding between a task instance and a parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceParameterRow {
    pub instance_id: String,
    pub trigger_id: String,
    pub def_key: String,
    pub async_task_ref: String,
    pub business_id: String,
    pub ref_name: String,
    pub serial_no: i32,
    pub parameter_id: String,
    pub required: bool,
    /// `INPUT` or `OUTPUT`.
    pub kind: String,
    pub workflow_type: String,
}

// ---------------------------------------------------------------------------
// parameters
// ---------------------------------------------------------------------------

/// An immutable typed value.  `value` holds the canonical string form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRow {
    pub id: String,
    pub type_name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// trigger_events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEventParameterRow {
    pub name: String,
    pub parameter_id: String,
}

/// An inbound webhook or manual trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEventRow {
    pub id: String,
    pub project_id: String,
    /// `WEBHOOK` or `MANUAL`.
    pub trigger_type: String,
    pub parameters: Vec<TriggerEventParameterRow>,
    pub occurred_time: DateTime<Utc>,
}
