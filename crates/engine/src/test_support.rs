//! Shared fixtures for the engine's async tests.

use std::sync::Arc;

use db::DbPool;
use nodes::{InMemoryCatalog, NodeDef, NodeParameter};
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::expression::TemplateExpressionLanguage;
use crate::models::{Workflow, WorkflowDefinition};
use crate::orchestrator::{Orchestrator, TaskActivatingCmd, TaskDispatch};
use crate::parameter::{save_parameters, ParameterType};
use crate::registry::WorkflowRegistry;
use crate::task::TaskInstance;
use crate::trigger::{TriggerService, TriggerSource};

pub(crate) const WORKFLOW_REF: &str = "release";
pub(crate) const WORKFLOW_VERSION: &str = "1.0";

pub(crate) struct Harness {
    pub pool: DbPool,
    pub orchestrator: Orchestrator,
    pub triggers: TriggerService,
    pub ctx: CallContext,
}

fn input(ref_name: &str, required: bool, default: Option<&str>) -> NodeParameter {
    NodeParameter {
        ref_name: ref_name.into(),
        type_name: "STRING".into(),
        required,
        parameter_id: default.map(str::to_owned),
    }
}

/// `git` builds and reports a `version`; `kubectl` deploys and reports nothing.
fn catalog(branch_default: &str) -> InMemoryCatalog {
    InMemoryCatalog::with_definitions([
        NodeDef {
            node_type: "git".into(),
            name: "Git build".into(),
            worker_type: Some("DOCKER".into()),
            input_parameters: vec![input("target", true, None), input("branch", false, Some(branch_default))],
            output_parameters: vec![input("version", true, None)],
            ..NodeDef::default()
        },
        NodeDef {
            node_type: "kubectl".into(),
            name: "Deploy".into(),
            input_parameters: vec![input("image", true, None), input("tag", true, None)],
            ..NodeDef::default()
        },
    ])
    .expect("fixture catalog is valid")
}

/// `build` (git) → `deploy` (kubectl).
pub(crate) fn workflow() -> Workflow {
    let def: WorkflowDefinition = serde_json::from_value(json!({
        "ref": WORKFLOW_REF,
        "version": WORKFLOW_VERSION,
        "name": "Release",
        "nodes": [
            { "ref": "build", "type": "git",
              "inputs": [{ "ref": "target", "type": "STRING", "expression": "${trigger.repo}" }] },
            { "ref": "deploy", "type": "kubectl", "dependsOn": ["build"],
              "inputs": [
                { "ref": "image", "type": "STRING", "expression": "${trigger.repo}:${build.version}" },
                { "ref": "tag", "type": "STRING", "expression": "${global.env}-${FLOW.build.version}" }
              ] }
        ],
        "globalParameters": [{ "name": "env", "type": "STRING", "value": "prod" }]
    }))
    .expect("fixture workflow parses");
    Workflow::try_from(def).expect("fixture workflow is valid")
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_dispatcher(dispatcher: queue::DispatchSender<TaskDispatch>) -> Self {
        Self::build(Some(dispatcher)).await
    }

    async fn build(dispatcher: Option<queue::DispatchSender<TaskDispatch>>) -> Self {
        let pool = db::pool::create_pool();

        let branch = ParameterType::String.parse("main").unwrap();
        let mut tx = pool.begin().await.unwrap();
        save_parameters(&mut tx, [&branch]).unwrap();
        tx.commit().await.unwrap();

        WorkflowRegistry::new(pool.clone()).register(workflow()).await.unwrap();

        let mut orchestrator = Orchestrator::new(
            pool.clone(),
            Arc::new(catalog(branch.id())),
            Arc::new(TemplateExpressionLanguage::new()),
            EngineConfig::default(),
        );
        if let Some(dispatcher) = dispatcher {
            orchestrator = orchestrator.with_dispatcher(dispatcher);
        }
        Self {
            triggers: TriggerService::new(pool.clone()),
            pool,
            orchestrator,
            ctx: CallContext::new("test"),
        }
    }

    /// Ingest a webhook and return the command for the `start` volume.
    pub async fn trigger(&self, payload: Value) -> TaskActivatingCmd {
        self.triggers
            .ingest(&self.ctx, "project-1", WORKFLOW_REF, WORKFLOW_VERSION, TriggerSource::Webhook { payload })
            .await
            .unwrap()
            .command
    }

    /// Command for `node_ref` in the run of `trigger_id` with a new business id.
    pub fn command(&self, trigger_id: &str, node_ref: &str) -> TaskActivatingCmd {
        TaskActivatingCmd {
            workflow_ref: WORKFLOW_REF.into(),
            workflow_version: WORKFLOW_VERSION.into(),
            node_ref: node_ref.into(),
            trigger_id: trigger_id.into(),
            async_task_instance_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Activate, pick up and succeed in one go.
    pub async fn run_to_success(&self, cmd: &TaskActivatingCmd, payload: &str) -> TaskInstance {
        let task = self.orchestrator.activate(&self.ctx, cmd).await.unwrap();
        self.orchestrator.mark_running(&self.ctx, task.id(), "worker-1").await.unwrap();
        self.orchestrator.succeed(&self.ctx, task.id(), payload).await.unwrap()
    }

    /// Trigger with `{repo: "acme/app"}` and get the run past its `start`.
    pub async fn started_run(&self) -> String {
        let start = self.trigger(json!({ "repo": "acme/app" })).await;
        self.run_to_success(&start, "").await;
        start.trigger_id
    }

    /// `ref -> value` of one kind of binding of a task instance.
    pub async fn bound(&self, task_instance_id: &str, kind: crate::InstanceParameterKind) -> Vec<(String, String)> {
        let mut values: Vec<(String, String)> = self
            .orchestrator
            .find_instance_parameters(task_instance_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|(b, _)| b.kind() == kind)
            .map(|(b, p)| (b.ref_name().to_owned(), p.string_value()))
            .collect();
        values.sort();
        values
    }
}
