//! Instance parameter binder.
//!
//! Reconciles computed input values with a node type's formal schema and
//! captures outputs from a worker result document.  Nothing here touches
//! storage; the orchestrator persists what these functions return.

use std::collections::HashMap;

use nodes::{NodeDef, NodeParameter};
use serde_json::Value;
use tracing::debug;

use crate::EngineError;
use crate::instance_parameter::{InstanceParameter, InstanceParameterKind};
use crate::models::WorkflowType;
use crate::parameter::{Parameter, ParameterType};
use crate::task::TaskInstance;

pub const INNER_EXECUTION_STATUS: &str = "inner.execution_status";
pub const INNER_START_TIME: &str = "inner.start_time";
pub const INNER_END_TIME: &str = "inner.end_time";

const INNER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bindings plus the new parameters they reference.  Bindings that reuse
/// an already stored parameter (node-type defaults) have no entry in
/// `parameters`.
#[derive(Debug, Clone, Default)]
pub struct BoundParameters {
    pub bindings: Vec<InstanceParameter>,
    pub parameters: Vec<Parameter>,
}

impl BoundParameters {
    fn push_new(&mut self, binding: InstanceParameter, parameter: Parameter) {
        self.bindings.push(binding);
        self.parameters.push(parameter);
    }

    pub fn extend(&mut self, other: BoundParameters) {
        self.bindings.extend(other.bindings);
        self.parameters.extend(other.parameters);
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One INPUT binding per declared input ref.
///
/// A computed value wins; otherwise the node type's default parameter is
/// bound.  Computed values with no declared ref are dropped.
pub fn bind_inputs(
    computed: &HashMap<String, Parameter>,
    task: &TaskInstance,
    workflow_type: WorkflowType,
    declared: &[NodeParameter],
) -> BoundParameters {
    let mut bound = BoundParameters::default();
    for input in declared {
        let binding = |parameter_id: &str| {
            InstanceParameter::for_task(
                task,
                workflow_type,
                InstanceParameterKind::Input,
                input.ref_name.as_str(),
                parameter_id,
                input.required,
            )
        };
        match (computed.get(&input.ref_name), &input.parameter_id) {
            (Some(parameter), _) => bound.push_new(binding(parameter.id()), parameter.clone()),
            (None, Some(default_id)) => bound.bindings.push(binding(default_id)),
            (None, None) => debug!(input = %input.ref_name, "declared input has no value and no default"),
        }
    }
    bound
}

/// Capture the declared outputs present in a worker result document.
///
/// Node types without declared outputs ignore the payload.  Otherwise an
/// empty or unparseable payload, a document matching no declared output,
/// or a value that does not fit its declared type is a
/// [`EngineError::MalformedResultPayload`].
pub fn capture_outputs(
    payload: &str,
    node_def: &NodeDef,
    task: &TaskInstance,
    workflow_type: WorkflowType,
) -> Result<BoundParameters, EngineError> {
    let mut bound = BoundParameters::default();
    if !node_def.declares_outputs() {
        return Ok(bound);
    }
    if payload.trim().is_empty() {
        return Err(EngineError::MalformedResultPayload("result payload is empty".into()));
    }
    let document = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(EngineError::MalformedResultPayload(
                "result payload is not a JSON object".into(),
            ))
        }
        Err(e) => return Err(EngineError::MalformedResultPayload(e.to_string())),
    };

    let matched = node_def.matched_output_parameters(&document);
    if matched.is_empty() {
        return Err(EngineError::MalformedResultPayload(format!(
            "no declared output of '{}' present in result",
            node_def.node_type
        )));
    }

    for output in matched {
        let Some(raw) = document.get(&output.ref_name) else { continue };
        let parameter = ParameterType::from_name(&output.type_name)
            .and_then(|parameter_type| parameter_type.new_parameter(raw))
            .map_err(|e| EngineError::MalformedResultPayload(format!("output '{}': {e}", output.ref_name)))?;
        let binding = InstanceParameter::for_task(
            task,
            workflow_type,
            InstanceParameterKind::Output,
            output.ref_name.as_str(),
            parameter.id(),
            output.required,
        );
        bound.push_new(binding, parameter);
    }
    Ok(bound)
}

/// The three metadata outputs every terminal task instance carries.
pub fn inner_outputs(
    task: &TaskInstance,
    workflow_type: WorkflowType,
) -> Result<BoundParameters, EngineError> {
    let end_time = task.end_time().unwrap_or_else(chrono::Utc::now);
    let values = [
        (INNER_EXECUTION_STATUS, task.status().name().to_owned()),
        (INNER_START_TIME, task.start_time().format(INNER_TIME_FORMAT).to_string()),
        (INNER_END_TIME, end_time.format(INNER_TIME_FORMAT).to_string()),
    ];

    let mut bound = BoundParameters::default();
    for (ref_name, value) in values {
        let parameter = ParameterType::String.parse(&value)?;
        let binding = InstanceParameter::for_task(
            task,
            workflow_type,
            InstanceParameterKind::Output,
            ref_name,
            parameter.id(),
            true,
        );
        bound.push_new(binding, parameter);
    }
    Ok(bound)
}
