//! Trigger ingestion: turn an inbound webhook or manual trigger into
//! `trigger.*` parameters, open a workflow instance and hand back the
//! command that activates its `start` volume.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use db::DbPool;
use db::models::{TriggerEventParameterRow, TriggerEventRow};
use db::repository::{trigger_events as trigger_repo, workflow_instances as instance_repo, workflows as workflow_repo};
use nodes::START_NODE_TYPE;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, Span};
use uuid::Uuid;

use crate::EngineError;
use crate::context::CallContext;
use crate::orchestrator::TaskActivatingCmd;
use crate::parameter::{load_parameters, save_parameters, Parameter, ParameterType};
use crate::workflow_instance::WorkflowInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Webhook,
    Manual,
}

impl TriggerType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Webhook => "WEBHOOK",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TriggerType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEBHOOK" => Ok(Self::Webhook),
            "MANUAL" => Ok(Self::Manual),
            other => Err(EngineError::UnknownValue {
                kind: "trigger type",
                value: other.to_owned(),
            }),
        }
    }
}

/// One explicitly typed value of a manual trigger.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManualParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSource {
    /// Each top-level key of the JSON object becomes `trigger.<key>`.
    Webhook { payload: Value },
    Manual { parameters: Vec<ManualParameter> },
}

impl TriggerSource {
    fn trigger_type(&self) -> TriggerType {
        match self {
            Self::Webhook { .. } => TriggerType::Webhook,
            Self::Manual { .. } => TriggerType::Manual,
        }
    }

    /// Named parameters in a stable order.  Names must be unique: each one
    /// becomes a single `trigger.<name>` scope entry.
    fn parameters(&self) -> Result<Vec<(String, Parameter)>, EngineError> {
        let named = match self {
            Self::Webhook { payload } => webhook_parameters(payload)?,
            Self::Manual { parameters } => parameters
                .iter()
                .map(|p| {
                    let parameter = ParameterType::from_name(&p.type_name)?.new_parameter(&p.value)?;
                    Ok((p.name.clone(), parameter))
                })
                .collect::<Result<Vec<_>, EngineError>>()?,
        };
        let mut seen = HashSet::with_capacity(named.len());
        for (name, _) in &named {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::InvalidTrigger(format!("parameter '{name}' given more than once")));
            }
        }
        Ok(named)
    }
}

/// Flatten a webhook body.  Nulls are skipped; arrays and objects are kept
/// as their JSON text.
fn webhook_parameters(payload: &Value) -> Result<Vec<(String, Parameter)>, EngineError> {
    let Value::Object(map) = payload else {
        return Err(EngineError::InvalidTrigger("webhook payload must be a JSON object".into()));
    };
    let mut parameters = Vec::with_capacity(map.len());
    for (name, value) in map {
        let parameter_type = match value {
            Value::Null => continue,
            Value::Bool(_) => ParameterType::Bool,
            Value::Number(_) => ParameterType::Number,
            Value::String(_) | Value::Array(_) | Value::Object(_) => ParameterType::String,
        };
        parameters.push((name.clone(), parameter_type.new_parameter(value)?));
    }
    Ok(parameters)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEventParameter {
    pub name: String,
    pub parameter_id: String,
}

/// Immutable record of one inbound trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub id: String,
    pub project_id: String,
    pub trigger_type: TriggerType,
    pub parameters: Vec<TriggerEventParameter>,
    pub occurred_time: DateTime<Utc>,
}

impl TriggerEvent {
    fn to_row(&self) -> TriggerEventRow {
        TriggerEventRow {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            trigger_type: self.trigger_type.name().to_owned(),
            parameters: self
                .parameters
                .iter()
                .map(|p| TriggerEventParameterRow {
                    name: p.name.clone(),
                    parameter_id: p.parameter_id.clone(),
                })
                .collect(),
            occurred_time: self.occurred_time,
        }
    }

    fn from_row(row: TriggerEventRow) -> Result<Self, EngineError> {
        Ok(Self {
            trigger_type: row.trigger_type.parse()?,
            id: row.id,
            project_id: row.project_id,
            parameters: row
                .parameters
                .into_iter()
                .map(|p| TriggerEventParameter {
                    name: p.name,
                    parameter_id: p.parameter_id,
                })
                .collect(),
            occurred_time: row.occurred_time,
        })
    }
}

/// Load the trigger event and its parameters, in event order.
pub(crate) fn load_trigger_parameters(
    tx: &db::Transaction,
    trigger_id: &str,
) -> Result<Vec<(String, Parameter)>, EngineError> {
    let row = trigger_repo::find_by_id(tx, trigger_id)?
        .ok_or_else(|| EngineError::not_found("trigger event", trigger_id))?;
    let event = TriggerEvent::from_row(row)?;
    let ids: Vec<String> = event.parameters.iter().map(|p| p.parameter_id.clone()).collect();
    let mut stored = load_parameters(tx, &ids)?;
    event
        .parameters
        .into_iter()
        .map(|p| {
            let parameter = stored
                .remove(&p.parameter_id)
                .ok_or_else(|| EngineError::not_found("parameter", p.parameter_id.as_str()))?;
            Ok((p.name, parameter))
        })
        .collect()
}

/// What ingestion produced.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub event: TriggerEvent,
    pub workflow_instance: WorkflowInstance,
    /// Activates the `start` volume of the new instance.
    pub command: TaskActivatingCmd,
}

#[derive(Clone)]
pub struct TriggerService {
    pool: DbPool,
}

impl TriggerService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist the trigger's parameters, the event and an `INIT` workflow
    /// instance in one transaction.
    #[instrument(
        skip(self, ctx, source),
        fields(correlation_id = %ctx.correlation_id, trigger_id = tracing::field::Empty)
    )]
    pub async fn ingest(
        &self,
        ctx: &CallContext,
        project_id: &str,
        workflow_ref: &str,
        workflow_version: &str,
        source: TriggerSource,
    ) -> Result<TriggerOutcome, EngineError> {
        let named = source.parameters()?;
        let event = TriggerEvent {
            id: Uuid::new_v4().simple().to_string(),
            project_id: project_id.to_owned(),
            trigger_type: source.trigger_type(),
            parameters: named
                .iter()
                .map(|(name, p)| TriggerEventParameter {
                    name: name.clone(),
                    parameter_id: p.id().to_owned(),
                })
                .collect(),
            occurred_time: Utc::now(),
        };
        Span::current().record("trigger_id", event.id.as_str());

        let mut tx = self.pool.begin().await?;
        if workflow_repo::find_by_ref_and_version(&tx, workflow_ref, workflow_version)?.is_none() {
            return Err(EngineError::not_found("workflow", format!("{workflow_ref}@{workflow_version}")));
        }
        let workflow_instance = WorkflowInstance::new(&event.id, workflow_ref, workflow_version);

        save_parameters(&mut tx, named.iter().map(|(_, p)| p))?;
        trigger_repo::insert(&mut tx, event.to_row())?;
        instance_repo::insert(&mut tx, workflow_instance.to_row())?;
        tx.commit().await?;

        info!(
            trigger_type = %event.trigger_type,
            parameters = event.parameters.len(),
            "trigger event ingested"
        );

        let command = TaskActivatingCmd {
            workflow_ref: workflow_ref.to_owned(),
            workflow_version: workflow_version.to_owned(),
            node_ref: START_NODE_TYPE.to_owned(),
            trigger_id: event.id.clone(),
            async_task_instance_id: Uuid::new_v4().simple().to_string(),
        };
        Ok(TriggerOutcome {
            event,
            workflow_instance,
            command,
        })
    }
}
