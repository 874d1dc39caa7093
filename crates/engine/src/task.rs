//! Task instances: one execution attempt of one DAG node in one triggered run.
//!
//! ```text
//! WAITING ──► RUNNING ──► SUCCEEDED
//!    │           │
//!    └───────────┴──────► FAILED
//! ```
//!
//! Transitions are one-way.  A retry is a new instance with the same
//! `business_id` and the next `serial_no`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nodes::{NodeDef, END_NODE_TYPE, START_NODE_TYPE};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::TaskInstanceRow;

use crate::EngineError;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(EngineError::UnknownValue {
                kind: "task status",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeInfo
// ---------------------------------------------------------------------------

/// Snapshot of node-type metadata taken when the task was activated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub creator_name: Option<String>,
    pub creator_ref: Option<String>,
    pub owner_name: Option<String>,
    pub owner_ref: Option<String>,
    pub owner_type: Option<String>,
    pub worker_type: Option<String>,
    pub document_link: Option<String>,
    pub source_link: Option<String>,
}

impl From<&NodeDef> for NodeInfo {
    fn from(def: &NodeDef) -> Self {
        Self {
            name: def.name.clone(),
            node_type: def.node_type.clone(),
            icon: def.icon.clone(),
            description: def.description.clone(),
            creator_name: def.creator_name.clone(),
            creator_ref: def.creator_ref.clone(),
            owner_name: def.owner_name.clone(),
            owner_ref: def.owner_ref.clone(),
            owner_type: def.owner_type.clone(),
            worker_type: def.worker_type.clone(),
            document_link: def.document_link.clone(),
            source_link: def.source_link.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskInstance
// ---------------------------------------------------------------------------

/// Everything needed to create a task instance.
#[derive(Debug, Clone)]
pub struct NewTaskInstance {
    pub serial_no: i32,
    pub def_key: String,
    pub node_info: NodeInfo,
    pub async_task_ref: String,
    pub workflow_ref: String,
    pub workflow_version: String,
    pub business_id: String,
    pub trigger_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInstance {
    id: String,
    serial_no: i32,
    def_key: String,
    node_info: NodeInfo,
    async_task_ref: String,
    workflow_ref: String,
    workflow_version: String,
    business_id: String,
    trigger_id: String,
    status: TaskStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    worker_id: Option<String>,
}

impl TaskInstance {
    /// Create a fresh `WAITING` instance.
    pub fn new(fields: NewTaskInstance) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            serial_no: fields.serial_no,
            def_key: fields.def_key,
            node_info: fields.node_info,
            async_task_ref: fields.async_task_ref,
            workflow_ref: fields.workflow_ref,
            workflow_version: fields.workflow_version,
            business_id: fields.business_id,
            trigger_id: fields.trigger_id,
            status: TaskStatus::Waiting,
            start_time: Utc::now(),
            end_time: None,
            worker_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn serial_no(&self) -> i32 {
        self.serial_no
    }

    pub fn def_key(&self) -> &str {
        &self.def_key
    }

    pub fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    pub fn async_task_ref(&self) -> &str {
        &self.async_task_ref
    }

    pub fn workflow_ref(&self) -> &str {
        &self.workflow_ref
    }

    pub fn workflow_version(&self) -> &str {
        &self.workflow_version
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }

    /// `start` and `end` bookkeeping tasks.
    pub fn is_volume(&self) -> bool {
        self.is_creation_volume() || self.is_deletion_volume()
    }

    pub fn is_creation_volume(&self) -> bool {
        self.def_key == START_NODE_TYPE
    }

    pub fn is_deletion_volume(&self) -> bool {
        self.def_key == END_NODE_TYPE
    }

    /// `WAITING → RUNNING`.  Returns `false` if already running.
    pub fn running(&mut self, worker_id: &str) -> Result<bool, EngineError> {
        match self.status {
            TaskStatus::Waiting => {
                self.status = TaskStatus::Running;
                self.worker_id = Some(worker_id.to_owned());
                Ok(true)
            }
            TaskStatus::Running => Ok(false),
            from => Err(EngineError::task_transition(&self.id, from, TaskStatus::Running)),
        }
    }

    /// `RUNNING → SUCCEEDED`.
    pub fn execute_succeeded(&mut self) -> Result<(), EngineError> {
        if self.status != TaskStatus::Running {
            return Err(EngineError::task_transition(&self.id, self.status, TaskStatus::Succeeded));
        }
        self.finish(TaskStatus::Succeeded);
        Ok(())
    }

    /// `WAITING | RUNNING → FAILED`.
    pub fn execute_failed(&mut self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::task_transition(&self.id, self.status, TaskStatus::Failed));
        }
        self.finish(TaskStatus::Failed);
        Ok(())
    }

    fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }

    pub(crate) fn to_row(&self) -> Result<TaskInstanceRow, EngineError> {
        Ok(TaskInstanceRow {
            id: self.id.clone(),
            serial_no: self.serial_no,
            def_key: self.def_key.clone(),
            node_info: serde_json::to_value(&self.node_info)?,
            async_task_ref: self.async_task_ref.clone(),
            workflow_ref: self.workflow_ref.clone(),
            workflow_version: self.workflow_version.clone(),
            business_id: self.business_id.clone(),
            trigger_id: self.trigger_id.clone(),
            status: self.status.name().to_owned(),
            start_time: self.start_time,
            end_time: self.end_time,
            worker_id: self.worker_id.clone(),
        })
    }

    pub(crate) fn from_row(row: TaskInstanceRow) -> Result<Self, EngineError> {
        Ok(Self {
            status: row.status.parse()?,
            node_info: serde_json::from_value(row.node_info)?,
            id: row.id,
            serial_no: row.serial_no,
            def_key: row.def_key,
            async_task_ref: row.async_task_ref,
            workflow_ref: row.workflow_ref,
            workflow_version: row.workflow_version,
            business_id: row.business_id,
            trigger_id: row.trigger_id,
            start_time: row.start_time,
            end_time: row.end_time,
            worker_id: row.worker_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Admission control
// ---------------------------------------------------------------------------

/// Refuse a new attempt while any attempt sharing the business id is
/// still `WAITING` or `RUNNING`.
pub fn running_check(attempts: &[TaskInstance]) -> Result<(), EngineError> {
    match attempts.iter().find(|t| !t.status.is_terminal()) {
        Some(in_flight) => Err(EngineError::ConcurrentActivationConflict {
            business_id: in_flight.business_id.clone(),
        }),
        None => Ok(()),
    }
}

/// Serial number of the next attempt: one past the highest so far.
pub fn next_serial_no(attempts: &[TaskInstance]) -> i32 {
    attempts.iter().map(|t| t.serial_no).max().unwrap_or(0) + 1
}
