//! Named INPUT/OUTPUT bindings between a task instance and a parameter.

use std::fmt;
use std::str::FromStr;

use db::models::InstanceParameterRow;

use crate::EngineError;
use crate::models::WorkflowType;
use crate::task::TaskInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceParameterKind {
    Input,
    Output,
}

impl InstanceParameterKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

impl fmt::Display for InstanceParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InstanceParameterKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INPUT" => Ok(Self::Input),
            "OUTPUT" => Ok(Self::Output),
            other => Err(EngineError::UnknownValue {
                kind: "instance parameter kind",
                value: other.to_owned(),
            }),
        }
    }
}

/// Immutable once written.  Many bindings may share one parameter id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceParameter {
    instance_id: String,
    trigger_id: String,
    def_key: String,
    async_task_ref: String,
    business_id: String,
    ref_name: String,
    serial_no: i32,
    parameter_id: String,
    required: bool,
    kind: InstanceParameterKind,
    workflow_type: WorkflowType,
}

impl InstanceParameter {
    /// A binding of `parameter_id` under `ref_name` for `task`.
    pub fn for_task(
        task: &TaskInstance,
        workflow_type: WorkflowType,
        kind: InstanceParameterKind,
        ref_name: impl Into<String>,
        parameter_id: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            instance_id: task.id().to_owned(),
            trigger_id: task.trigger_id().to_owned(),
            def_key: task.def_key().to_owned(),
            async_task_ref: task.async_task_ref().to_owned(),
            business_id: task.business_id().to_owned(),
            ref_name: ref_name.into(),
            serial_no: task.serial_no(),
            parameter_id: parameter_id.into(),
            required,
            kind,
            workflow_type,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn trigger_id(&self) -> &str {
        &self.trigger_id
    }

    pub fn def_key(&self) -> &str {
        &self.def_key
    }

    pub fn async_task_ref(&self) -> &str {
        &self.async_task_ref
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn serial_no(&self) -> i32 {
        self.serial_no
    }

    pub fn parameter_id(&self) -> &str {
        &self.parameter_id
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn kind(&self) -> InstanceParameterKind {
        self.kind
    }

    pub fn workflow_type(&self) -> WorkflowType {
        self.workflow_type
    }

    pub(crate) fn to_row(&self) -> InstanceParameterRow {
        InstanceParameterRow {
            instance_id: self.instance_id.clone(),
            trigger_id: self.trigger_id.clone(),
            def_key: self.def_key.clone(),
            async_task_ref: self.async_task_ref.clone(),
            business_id: self.business_id.clone(),
            ref_name: self.ref_name.clone(),
            serial_no: self.serial_no,
            parameter_id: self.parameter_id.clone(),
            required: self.required,
            kind: self.kind.name().to_owned(),
            workflow_type: self.workflow_type.name().to_owned(),
        }
    }

    pub(crate) fn from_row(row: InstanceParameterRow) -> Result<Self, EngineError> {
        Ok(Self {
            kind: row.kind.parse()?,
            workflow_type: row.workflow_type.parse()?,
            instance_id: row.instance_id,
            trigger_id: row.trigger_id,
            def_key: row.def_key,
            async_task_ref: row.async_task_ref,
            business_id: row.business_id,
            ref_name: row.ref_name,
            serial_no: row.serial_no,
            parameter_id: row.parameter_id,
            required: row.required,
        })
    }
}
