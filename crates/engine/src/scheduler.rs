//! Decides which nodes of a run are ready to be activated.

use std::collections::HashMap;

use nodes::END_NODE_TYPE;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::EngineError;
use crate::context::CallContext;
use crate::models::Workflow;
use crate::orchestrator::{load_workflow, load_workflow_instance, Orchestrator, TaskActivatingCmd};
use crate::task::{TaskInstance, TaskStatus};
use crate::workflow_instance::{ProcessStatus, WorkflowInstance};

/// Activation commands for everything runnable right now.
///
/// - `RUNNING` run: every declared node without an attempt whose
///   dependencies all succeeded (latest attempt per node); once every
///   declared node succeeded and nothing is in flight, the `end` volume.
/// - `TERMINATED` run: the `end` volume once nothing is in flight.
/// - otherwise, or once an `end` exists: nothing.
///
/// Each command carries a fresh business id, so callers activate the
/// returned commands before asking again.
pub fn ready_commands(
    workflow: &Workflow,
    instance: &WorkflowInstance,
    tasks: &[TaskInstance],
) -> Vec<TaskActivatingCmd> {
    if tasks.iter().any(TaskInstance::is_deletion_volume) {
        return Vec::new();
    }

    let mut latest: HashMap<&str, &TaskInstance> = HashMap::new();
    for task in tasks {
        let entry = latest.entry(task.async_task_ref()).or_insert(task);
        if task.serial_no() > entry.serial_no() {
            *entry = task;
        }
    }
    let in_flight = latest.values().any(|t| !t.status().is_terminal());
    let succeeded = |node_ref: &str| latest.get(node_ref).is_some_and(|t| t.status() == TaskStatus::Succeeded);

    let command = |node_ref: &str| TaskActivatingCmd {
        workflow_ref: workflow.workflow_ref().to_owned(),
        workflow_version: workflow.version().to_owned(),
        node_ref: node_ref.to_owned(),
        trigger_id: instance.trigger_id().to_owned(),
        async_task_instance_id: Uuid::new_v4().simple().to_string(),
    };

    match instance.status() {
        ProcessStatus::Running => {
            let ready: Vec<TaskActivatingCmd> = workflow
                .topological_order()
                .iter()
                .filter(|node_ref| !latest.contains_key(node_ref.as_str()))
                .filter(|node_ref| {
                    workflow
                        .predecessors(node_ref)
                        .is_ok_and(|deps| deps.iter().all(|d| succeeded(d)))
                })
                .map(|node_ref| command(node_ref))
                .collect();
            if !ready.is_empty() {
                return ready;
            }
            let all_done = workflow.nodes().iter().all(|n| succeeded(&n.ref_name));
            if all_done && !in_flight {
                vec![command(END_NODE_TYPE)]
            } else {
                Vec::new()
            }
        }
        ProcessStatus::Terminated if !in_flight => vec![command(END_NODE_TYPE)],
        _ => Vec::new(),
    }
}

impl Orchestrator {
    /// Commands for every node of the run that can be activated now.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id, trigger_id = %trigger_id))]
    pub async fn next_commands(
        &self,
        ctx: &CallContext,
        trigger_id: &str,
    ) -> Result<Vec<TaskActivatingCmd>, EngineError> {
        let tx = self.pool().begin().await?;
        let instance = load_workflow_instance(&tx, trigger_id)?;
        let workflow = load_workflow(&tx, instance.workflow_ref(), instance.workflow_version())?;
        let tasks = db::repository::task_instances::find_by_trigger_id(&tx, trigger_id)?
            .into_iter()
            .map(TaskInstance::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tx.rollback().await?;

        let commands = ready_commands(&workflow, &instance, &tasks);
        debug!(
            "{} node(s) ready: {:?}",
            commands.len(),
            commands.iter().map(|c| c.node_ref.as_str()).collect::<Vec<_>>()
        );
        Ok(commands)
    }
}
