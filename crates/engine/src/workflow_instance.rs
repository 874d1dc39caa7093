//! One triggered run of a workflow.  Volume tasks drive its status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use db::models::WorkflowInstanceRow;

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Init,
    Running,
    Finished,
    Terminated,
}

impl ProcessStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Terminated)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcessStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Self::Init),
            "RUNNING" => Ok(Self::Running),
            "FINISHED" => Ok(Self::Finished),
            "TERMINATED" => Ok(Self::Terminated),
            other => Err(EngineError::UnknownValue {
                kind: "workflow instance status",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowInstance {
    id: String,
    trigger_id: String,
    workflow_ref: String,
    workflow_version: String,
    status: ProcessStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn new(trigger_id: &str, workflow_ref: &str, workflow_version: &str) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            trigger_id: trigger_id.to_owned(),
            workflow_ref: workflow_ref.to_owned(),
            workflow_version: workflow_version.to_owned(),
            status: ProcessStatus::Init,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    pub fn workflow_ref(&self) -> &str {
        &self.workflow_ref
    }

    pub fn workflow_version(&self) -> &str {
        &self.workflow_version
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// The `start` volume succeeded.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(&[ProcessStatus::Init], ProcessStatus::Running)
    }

    /// The `start` volume failed before the run got going.
    pub fn terminate_in_start(&mut self) -> Result<(), EngineError> {
        self.transition(&[ProcessStatus::Init], ProcessStatus::Terminated)
    }

    pub fn terminate(&mut self) -> Result<(), EngineError> {
        self.transition(&[ProcessStatus::Init, ProcessStatus::Running], ProcessStatus::Terminated)
    }

    /// The `end` volume succeeded on a running instance.
    pub fn finish(&mut self) -> Result<(), EngineError> {
        self.transition(&[ProcessStatus::Running], ProcessStatus::Finished)
    }

    fn transition(&mut self, from: &[ProcessStatus], to: ProcessStatus) -> Result<(), EngineError> {
        if !from.contains(&self.status) {
            return Err(EngineError::InvalidTransition {
                entity: "workflow instance",
                id: self.id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub(crate) fn to_row(&self) -> WorkflowInstanceRow {
        WorkflowInstanceRow {
            id: self.id.clone(),
            trigger_id: self.trigger_id.clone(),
            workflow_ref: self.workflow_ref.clone(),
            workflow_version: self.workflow_version.clone(),
            status: self.status.name().to_owned(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    pub(crate) fn from_row(row: WorkflowInstanceRow) -> Result<Self, EngineError> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            trigger_id: row.trigger_id,
            workflow_ref: row.workflow_ref,
            workflow_version: row.workflow_version,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut wi = WorkflowInstance::new("t1", "wf", "1");
        assert_eq!(wi.status(), ProcessStatus::Init);
        wi.start().unwrap();
        wi.finish().unwrap();
        assert_eq!(wi.status(), ProcessStatus::Finished);
        assert!(wi.end_time().is_some());
    }

    #[test]
    fn terminate_in_start_only_from_init() {
        let mut wi = WorkflowInstance::new("t1", "wf", "1");
        wi.start().unwrap();
        assert!(matches!(wi.terminate_in_start(), Err(EngineError::InvalidTransition { .. })));
        wi.terminate().unwrap();
        assert!(wi.finish().is_err());
    }

    #[test]
    fn row_round_trip() {
        let mut wi = WorkflowInstance::new("t1", "wf", "1");
        wi.terminate().unwrap();
        assert_eq!(WorkflowInstance::from_row(wi.to_row()).unwrap(), wi);
    }
}
