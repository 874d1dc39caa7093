//! Scripted end-to-end runs against the in-memory stack.
//!
//! A scenario bundles a node catalog, one workflow, the webhook payload
//! that triggers it and the result each node's "worker" reports.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use engine::{
    CallContext, EngineConfig, InstanceParameterKind, Orchestrator, TaskActivatingCmd, TaskDispatch,
    TaskInstance, TaskStatus, TemplateExpressionLanguage, TriggerService, TriggerSource, Workflow,
    WorkflowDefinition, WorkflowRegistry,
};
use nodes::{InMemoryCatalog, NodeDef};
use queue::{DeferredResults, DispatchReceiver};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const WORKER_ID: &str = "dagrun-cli";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default = "default_project")]
    pub project_id: String,
    #[serde(default)]
    pub catalog: Vec<NodeDef>,
    pub workflow: WorkflowDefinition,
    #[serde(default)]
    pub trigger: Value,
    /// Worker result per node ref.  Missing nodes succeed with no payload.
    #[serde(default)]
    pub results: HashMap<String, NodeResult>,
}

fn default_project() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeResult {
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub payload: Value,
}

/// One row of the run summary.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub serial_no: i32,
    pub node_ref: String,
    pub status: TaskStatus,
    pub outputs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub trigger_id: String,
    pub workflow_status: engine::ProcessStatus,
    pub tasks: Vec<TaskSummary>,
}

impl Scenario {
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read scenario {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid scenario {}", path.display()))
    }
}

struct Runner {
    orchestrator: Orchestrator,
    dispatched: DispatchReceiver<TaskDispatch>,
    results: HashMap<String, NodeResult>,
    ctx: CallContext,
}

/// Drive the scenario until the run ends and report every attempt.
pub async fn run(scenario: Scenario, config: &EngineConfig) -> anyhow::Result<RunReport> {
    let pool = db::pool::create_pool();
    let catalog = InMemoryCatalog::with_definitions(scenario.catalog).context("invalid node catalog")?;
    let workflow = Workflow::try_from(scenario.workflow).context("invalid workflow")?;
    let workflow = WorkflowRegistry::new(pool.clone()).register(workflow).await?;

    let (dispatcher, dispatched) = queue::dispatch_channel(config.dispatch_buffer);
    let orchestrator = Orchestrator::new(
        pool.clone(),
        Arc::new(catalog),
        Arc::new(TemplateExpressionLanguage::new()),
        config.clone(),
    )
    .with_dispatcher(dispatcher)
    .with_deferred_results(Arc::new(DeferredResults::new()));

    let mut runner = Runner {
        orchestrator,
        dispatched,
        results: scenario.results,
        ctx: CallContext::generate(),
    };

    let outcome = TriggerService::new(pool)
        .ingest(
            &runner.ctx,
            &scenario.project_id,
            workflow.workflow_ref(),
            workflow.version(),
            TriggerSource::Webhook { payload: scenario.trigger },
        )
        .await?;
    let trigger_id = outcome.event.id.clone();

    let mut pending = vec![outcome.command];
    while !pending.is_empty() {
        for cmd in pending {
            runner.execute(&cmd).await?;
        }
        pending = runner.orchestrator.next_commands(&runner.ctx, &trigger_id).await?;
    }

    runner.report(&trigger_id).await
}

impl Runner {
    async fn execute(&mut self, cmd: &TaskActivatingCmd) -> anyhow::Result<()> {
        let task = self.orchestrator.activate(&self.ctx, cmd).await?;
        if task.status() == TaskStatus::Failed {
            warn!("'{}' failed before dispatch, aborting run", cmd.node_ref);
            return self.abort(&task).await;
        }
        let task = self.work(task).await?;
        if task.status() == TaskStatus::Failed && !task.is_deletion_volume() {
            return self.abort(&task).await;
        }
        Ok(())
    }

    /// Play the worker: accept the dispatched task and report its result.
    async fn work(&mut self, task: TaskInstance) -> anyhow::Result<TaskInstance> {
        while let Ok(item) = self.dispatched.try_recv() {
            let inputs: Vec<String> = item.inputs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            info!("dispatched '{}' with inputs [{}]", item.task_instance.async_task_ref(), inputs.join(", "));
        }

        self.orchestrator.mark_running(&self.ctx, task.id(), WORKER_ID).await?;
        let wait = self.orchestrator.register_wait(WORKER_ID, task.business_id());

        let result = self.results.get(task.async_task_ref()).cloned().unwrap_or_default();
        let finished = match result.status {
            ResultStatus::Succeeded => {
                let payload = match result.payload {
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                self.orchestrator.succeed(&self.ctx, task.id(), &payload).await?
            }
            ResultStatus::Failed => self.orchestrator.fail(&self.ctx, task.id()).await?,
        };

        let outcome = wait.outcome().await?;
        info!("worker wait for '{}' resolved: {:?}", finished.async_task_ref(), outcome);
        Ok(finished)
    }

    /// Terminate the run and play any cleanup task it synthesizes.
    async fn abort(&mut self, failed: &TaskInstance) -> anyhow::Result<()> {
        let outcome = self
            .orchestrator
            .terminate_by_trigger_id(&self.ctx, failed.trigger_id())
            .await?;
        if let Some(end) = outcome.synthesized_end {
            self.work(end).await?;
        }
        Ok(())
    }

    async fn report(&self, trigger_id: &str) -> anyhow::Result<RunReport> {
        let mut tasks = Vec::new();
        for task in self.orchestrator.find_tasks_by_trigger_id(trigger_id).await? {
            let outputs = self
                .orchestrator
                .find_instance_parameters(task.id())
                .await?
                .into_iter()
                .filter(|(binding, _)| binding.kind() == InstanceParameterKind::Output)
                .map(|(binding, parameter)| (binding.ref_name().to_owned(), parameter.to_string()))
                .collect();
            tasks.push(TaskSummary {
                serial_no: task.serial_no(),
                node_ref: task.async_task_ref().to_owned(),
                status: task.status(),
                outputs,
            });
        }
        let workflow_status = self.orchestrator.find_workflow_instance(trigger_id).await?.status();
        Ok(RunReport {
            trigger_id: trigger_id.to_owned(),
            workflow_status,
            tasks,
        })
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run {} {}", self.trigger_id, self.workflow_status)?;
        writeln!(f, "{:<4} {:<16} {:<10} outputs", "#", "node", "status")?;
        for task in &self.tasks {
            let outputs: Vec<String> = task.outputs.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(
                f,
                "{:<4} {:<16} {:<10} {}",
                task.serial_no,
                task.node_ref,
                task.status.to_string(),
                outputs.join(" ")
            )?;
        }
        Ok(())
    }
}
