//! Activation/completion orchestrator.
//!
//! Every public operation runs inside one transaction: task instance,
//! parameters and instance parameters become visible together or not at
//! all.  Hand-offs to the outside world (dispatch channel, deferred waits,
//! monitoring callbacks) happen only after the commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use db::repository::{
    instance_parameters as binding_repo, task_instances as task_repo,
    workflow_instances as instance_repo, workflows as workflow_repo,
};
use db::{DbPool, Transaction};
use nodes::{CatalogError, NodeDef, NodeDefApi, END_NODE_TYPE};
use queue::{DeferredResults, DeferredWait, DispatchPermit, DispatchSender, MonitoringCallbacks, WaitKey, WaitOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use crate::EngineError;
use crate::binder::{bind_inputs, capture_outputs, inner_outputs, BoundParameters};
use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::expression::ExpressionLanguage;
use crate::instance_parameter::InstanceParameter;
use crate::models::{Workflow, WorkflowType};
use crate::parameter::{load_parameters, save_parameters, Parameter};
use crate::scope::{ScopeContext, GLOBAL_SCOPE, TRIGGER_SCOPE};
use crate::task::{next_serial_no, running_check, NewTaskInstance, NodeInfo, TaskInstance, TaskStatus};
use crate::trigger::load_trigger_parameters;
use crate::workflow_instance::{ProcessStatus, WorkflowInstance};

// ---------------------------------------------------------------------------
// Commands and emitted items
// ---------------------------------------------------------------------------

/// Request to activate one node of one triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskActivatingCmd {
    pub workflow_ref: String,
    pub workflow_version: String,
    pub node_ref: String,
    pub trigger_id: String,
    /// Becomes the business id of the task instance.
    pub async_task_instance_id: String,
}

/// A freshly persisted `WAITING` task instance and its bound inputs,
/// keyed by input ref.
#[derive(Debug, Clone)]
pub struct TaskDispatch {
    pub task_instance: TaskInstance,
    pub inputs: HashMap<String, Parameter>,
}

/// Result of [`Orchestrator::terminate_by_trigger_id`].
#[derive(Debug, Clone, Default)]
pub struct TerminateOutcome {
    /// `WAITING` instances forced to `FAILED`.
    pub failed: Vec<TaskInstance>,
    /// The `end` volume created so cleanup still runs, if one was needed.
    pub synthesized_end: Option<TaskInstance>,
    /// Whether `synthesized_end` went out on the dispatch channel.
    pub end_dispatched: bool,
}

/// A registered wait on a worker callback, bounded by the configured timeout.
#[derive(Debug)]
pub struct WorkerWait {
    wait: DeferredWait,
    timeout: std::time::Duration,
}

impl WorkerWait {
    pub fn key(&self) -> &WaitKey {
        self.wait.key()
    }

    pub async fn outcome(self) -> Result<WaitOutcome, EngineError> {
        Ok(self.wait.wait(self.timeout).await?)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    pool: DbPool,
    catalog: Arc<dyn NodeDefApi>,
    expression_language: Arc<dyn ExpressionLanguage>,
    config: EngineConfig,
    dispatcher: Option<DispatchSender<TaskDispatch>>,
    deferred: Arc<DeferredResults>,
    callbacks: Arc<MonitoringCallbacks>,
}

impl Orchestrator {
    pub fn new(
        pool: DbPool,
        catalog: Arc<dyn NodeDefApi>,
        expression_language: Arc<dyn ExpressionLanguage>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            catalog,
            expression_language,
            config,
            dispatcher: None,
            deferred: Arc::new(DeferredResults::new()),
            callbacks: Arc::new(MonitoringCallbacks::new()),
        }
    }

    /// Emit every newly activated task instance on `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: DispatchSender<TaskDispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_deferred_results(mut self, deferred: Arc<DeferredResults>) -> Self {
        self.deferred = deferred;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<MonitoringCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &MonitoringCallbacks {
        &self.callbacks
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // activate
    // -----------------------------------------------------------------------

    /// Create the next attempt of `cmd.async_task_instance_id` for the node.
    ///
    /// An input expression that cannot be evaluated does not abort the
    /// transaction: the attempt is stored `FAILED` with its inner outputs
    /// and no inputs.  The same happens when a dispatcher is attached and
    /// its channel is full or closed.
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] for an unknown workflow, node or trigger.
    /// - [`EngineError::ConcurrentActivationConflict`] while another attempt
    ///   of the same business id is in flight.
    #[instrument(
        skip(self, ctx, cmd),
        fields(
            correlation_id = %ctx.correlation_id,
            trigger_id = %cmd.trigger_id,
            node_ref = %cmd.node_ref,
            business_id = %cmd.async_task_instance_id,
        )
    )]
    pub async fn activate(&self, ctx: &CallContext, cmd: &TaskActivatingCmd) -> Result<TaskInstance, EngineError> {
        let mut tx = self.pool.begin().await?;

        let workflow = load_workflow(&tx, &cmd.workflow_ref, &cmd.workflow_version)?;
        let node = workflow.find_node(&cmd.node_ref)?;
        let node_def = self.node_definition(&node.node_type).await?;

        // ------------------------------------------------------------------
        // Admission control: one in-flight attempt per business id.
        // ------------------------------------------------------------------
        let attempts = task_repo::find_by_business_id(&tx, &cmd.async_task_instance_id)?
            .into_iter()
            .map(TaskInstance::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        running_check(&attempts)?;

        let mut task = TaskInstance::new(NewTaskInstance {
            serial_no: next_serial_no(&attempts),
            def_key: node.node_type.clone(),
            node_info: NodeInfo::from(&node_def),
            async_task_ref: node.ref_name.clone(),
            workflow_ref: cmd.workflow_ref.clone(),
            workflow_version: cmd.workflow_version.clone(),
            business_id: cmd.async_task_instance_id.clone(),
            trigger_id: cmd.trigger_id.clone(),
        });

        // ------------------------------------------------------------------
        // Compute inputs against global + trigger + prior outputs.
        // ------------------------------------------------------------------
        let context = build_scope(&tx, &workflow, &cmd.trigger_id)?;
        let computed = match workflow.calculate_task_params(
            &cmd.node_ref,
            self.expression_language.as_ref(),
            &context,
        ) {
            Ok(computed) => computed,
            Err(EngineError::ExpressionEvaluation(e)) => {
                warn!("inputs of '{}' could not be computed: {}", cmd.node_ref, e);
                store_failed(&mut tx, &mut task, workflow.workflow_type())?;
                tx.commit().await?;
                return Ok(task);
            }
            Err(e) => return Err(e),
        };

        // A waiting task nobody can pick up would also block its business id,
        // so the dispatch slot is taken before anything is committed.
        let permit = match self.reserve_dispatch() {
            Ok(permit) => permit,
            Err(e) => {
                warn!("task '{}' cannot be dispatched: {}", cmd.node_ref, e);
                store_failed(&mut tx, &mut task, workflow.workflow_type())?;
                tx.commit().await?;
                return Ok(task);
            }
        };

        let inputs = bind_inputs(&computed, &task, workflow.workflow_type(), &node_def.input_parameters);
        let dispatch_inputs = resolve_inputs(&tx, &inputs)?;
        persist_bound(&mut tx, &inputs)?;
        task_repo::insert(&mut tx, task.to_row()?)?;
        tx.commit().await?;

        info!(
            "task '{}' activated as {} (serial {}) with {} inputs",
            task.async_task_ref(),
            task.id(),
            task.serial_no(),
            inputs.bindings.len()
        );
        if let Some(permit) = permit {
            permit.send(TaskDispatch {
                task_instance: task.clone(),
                inputs: dispatch_inputs,
            });
        }
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // markRunning
    // -----------------------------------------------------------------------

    /// `WAITING → RUNNING`, recording the accepting worker.  A second call on
    /// a running instance changes nothing.
    #[instrument(
        skip(self, ctx),
        fields(correlation_id = %ctx.correlation_id, trigger_id = tracing::field::Empty)
    )]
    pub async fn mark_running(
        &self,
        ctx: &CallContext,
        task_instance_id: &str,
        worker_id: &str,
    ) -> Result<TaskInstance, EngineError> {
        let mut tx = self.pool.begin().await?;
        let mut task = load_task(&tx, task_instance_id)?;
        Span::current().record("trigger_id", task.trigger_id());

        if task.running(worker_id)? {
            task_repo::update_status(&mut tx, &task.to_row()?)?;
            tx.commit().await?;
            info!("task '{}' running on worker '{}'", task.async_task_ref(), worker_id);
        } else {
            debug!("task '{}' already running", task.async_task_ref());
        }
        Ok(task)
    }

    // -----------------------------------------------------------------------
    // succeed / fail
    // -----------------------------------------------------------------------

    /// Report a successful worker run.
    ///
    /// Declared outputs are captured from `result_payload`.  A payload that
    /// is empty, unparseable or matches none of them turns the attempt into
    /// `FAILED` instead.  Volume tasks move the workflow instance.
    #[instrument(
        skip(self, ctx, result_payload),
        fields(correlation_id = %ctx.correlation_id, trigger_id = tracing::field::Empty)
    )]
    pub async fn succeed(
        &self,
        ctx: &CallContext,
        task_instance_id: &str,
        result_payload: &str,
    ) -> Result<TaskInstance, EngineError> {
        let tx = self.pool.begin().await?;
        let mut task = load_task(&tx, task_instance_id)?;
        Span::current().record("trigger_id", task.trigger_id());
        if task.status() != TaskStatus::Running {
            return Err(EngineError::task_transition(task.id(), task.status(), TaskStatus::Succeeded));
        }
        let workflow_type = load_workflow(&tx, task.workflow_ref(), task.workflow_version())?.workflow_type();

        let mut outputs = if task.is_volume() {
            task.execute_succeeded()?;
            BoundParameters::default()
        } else {
            let node_def = self.node_definition(task.def_key()).await?;
            match capture_outputs(result_payload, &node_def, &task, workflow_type) {
                Ok(captured) => {
                    task.execute_succeeded()?;
                    captured
                }
                Err(EngineError::MalformedResultPayload(reason)) => {
                    warn!("task '{}' reported unusable outputs: {}", task.async_task_ref(), reason);
                    task.execute_failed()?;
                    BoundParameters::default()
                }
                Err(e) => return Err(e),
            }
        };

        self.complete(tx, &mut task, workflow_type, &mut outputs).await?;
        Ok(task)
    }

    /// Report a failed worker run.  Inner outputs are still recorded.
    #[instrument(
        skip(self, ctx),
        fields(correlation_id = %ctx.correlation_id, trigger_id = tracing::field::Empty)
    )]
    pub async fn fail(&self, ctx: &CallContext, task_instance_id: &str) -> Result<TaskInstance, EngineError> {
        let tx = self.pool.begin().await?;
        let mut task = load_task(&tx, task_instance_id)?;
        Span::current().record("trigger_id", task.trigger_id());
        let workflow_type = load_workflow(&tx, task.workflow_ref(), task.workflow_version())?.workflow_type();

        task.execute_failed()?;
        self.complete(tx, &mut task, workflow_type, &mut BoundParameters::default()).await?;
        Ok(task)
    }

    /// Shared tail of `succeed`/`fail`: inner outputs, volume side effects,
    /// commit, then release whatever waits on the task.
    async fn complete(
        &self,
        mut tx: Transaction,
        task: &mut TaskInstance,
        workflow_type: WorkflowType,
        outputs: &mut BoundParameters,
    ) -> Result<(), EngineError> {
        outputs.extend(inner_outputs(task, workflow_type)?);
        persist_bound(&mut tx, outputs)?;
        task_repo::update_status(&mut tx, &task.to_row()?)?;
        apply_volume_effects(&mut tx, task)?;
        tx.commit().await?;

        let succeeded = task.status() == TaskStatus::Succeeded;
        if succeeded {
            info!("task '{}' succeeded", task.async_task_ref());
        } else {
            warn!("task '{}' failed", task.async_task_ref());
        }

        if let Some(worker_id) = task.worker_id() {
            let outcome = if succeeded { WaitOutcome::Succeeded } else { WaitOutcome::Failed };
            self.deferred.resolve(&WaitKey::new(worker_id, task.business_id()), outcome);
        }
        if task.is_deletion_volume() {
            self.callbacks.clear_by_trigger_id(task.trigger_id());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // terminate
    // -----------------------------------------------------------------------

    /// Cancel the outstanding worker wait of the current attempt of
    /// `business_id`.  Best effort: a `RUNNING` instance is not rolled back.
    /// Returns whether a wait was resolved.
    #[instrument(
        skip(self, ctx),
        fields(correlation_id = %ctx.correlation_id, trigger_id = tracing::field::Empty)
    )]
    pub async fn terminate(&self, ctx: &CallContext, business_id: &str) -> Result<bool, EngineError> {
        let tx = self.pool.begin().await?;
        let row = task_repo::find_by_business_id_and_max_serial_no(&tx, business_id)?;
        tx.rollback().await?;
        let task = TaskInstance::from_row(row.ok_or_else(|| EngineError::not_found("async task", business_id))?)?;
        Span::current().record("trigger_id", task.trigger_id());

        let Some(worker_id) = task.worker_id() else {
            debug!("task '{}' was never picked up by a worker", task.async_task_ref());
            return Ok(false);
        };
        let resolved = self.deferred.terminate(&WaitKey::new(worker_id, business_id));
        info!("terminate requested for '{}' (wait resolved: {})", task.async_task_ref(), resolved);
        Ok(resolved)
    }

    /// Abort a whole run.
    ///
    /// Every `WAITING` instance of the trigger except a pending `end` volume
    /// becomes `FAILED`.  When no instance is `RUNNING` and no `end` volume
    /// exists yet, a fresh `end` is created so cleanup still happens.  The
    /// new `end` is kept even if the dispatch channel has no room for it;
    /// [`TerminateOutcome::end_dispatched`] tells the caller to hand it
    /// over itself.
    #[instrument(
        skip(self, ctx),
        fields(correlation_id = %ctx.correlation_id, trigger_id = %trigger_id)
    )]
    pub async fn terminate_by_trigger_id(
        &self,
        ctx: &CallContext,
        trigger_id: &str,
    ) -> Result<TerminateOutcome, EngineError> {
        let mut tx = self.pool.begin().await?;
        let mut workflow_instance = load_workflow_instance(&tx, trigger_id)?;
        let workflow = load_workflow(&tx, workflow_instance.workflow_ref(), workflow_instance.workflow_version())?;
        let tasks = task_repo::find_by_trigger_id(&tx, trigger_id)?
            .into_iter()
            .map(TaskInstance::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let needs_cleanup = !tasks
            .iter()
            .any(|t| t.is_deletion_volume() || t.status() == TaskStatus::Running);

        // ------------------------------------------------------------------
        // Fail everything that never started.
        // ------------------------------------------------------------------
        let mut outcome = TerminateOutcome::default();
        for mut task in tasks
            .into_iter()
            .filter(|t| t.status() == TaskStatus::Waiting && !t.is_deletion_volume())
        {
            task.execute_failed()?;
            persist_bound(&mut tx, &inner_outputs(&task, workflow.workflow_type())?)?;
            task_repo::update_status(&mut tx, &task.to_row()?)?;
            outcome.failed.push(task);
        }

        if !workflow_instance.status().is_terminal() {
            workflow_instance.terminate()?;
            instance_repo::update_status(&mut tx, &workflow_instance.to_row())?;
        }

        // ------------------------------------------------------------------
        // Synthesize the cleanup volume.
        // ------------------------------------------------------------------
        let mut permit = None;
        if needs_cleanup {
            permit = self.reserve_dispatch().unwrap_or_else(|e| {
                warn!("cleanup of run '{}' cannot be dispatched: {}", trigger_id, e);
                None
            });
            let end_def = self.node_definition(END_NODE_TYPE).await?;
            let end = TaskInstance::new(NewTaskInstance {
                serial_no: 1,
                def_key: END_NODE_TYPE.to_owned(),
                node_info: NodeInfo::from(&end_def),
                async_task_ref: END_NODE_TYPE.to_owned(),
                workflow_ref: workflow.workflow_ref().to_owned(),
                workflow_version: workflow.version().to_owned(),
                business_id: Uuid::new_v4().simple().to_string(),
                trigger_id: trigger_id.to_owned(),
            });
            task_repo::insert(&mut tx, end.to_row()?)?;
            outcome.synthesized_end = Some(end);
        }
        tx.commit().await?;

        info!(
            "run terminated: {} waiting task(s) failed, cleanup synthesized: {}",
            outcome.failed.len(),
            outcome.synthesized_end.is_some()
        );
        if let (Some(permit), Some(end)) = (permit, &outcome.synthesized_end) {
            permit.send(TaskDispatch {
                task_instance: end.clone(),
                inputs: HashMap::new(),
            });
            outcome.end_dispatched = true;
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Every task instance currently `RUNNING`, across all runs.
    pub async fn find_running_tasks(&self) -> Result<Vec<TaskInstance>, EngineError> {
        let tx = self.pool.begin().await?;
        let rows = task_repo::find_by_status(&tx, TaskStatus::Running.name())?;
        tx.rollback().await?;
        rows.into_iter().map(TaskInstance::from_row).collect()
    }

    /// Every attempt of a trigger run, in creation order.
    pub async fn find_tasks_by_trigger_id(&self, trigger_id: &str) -> Result<Vec<TaskInstance>, EngineError> {
        let tx = self.pool.begin().await?;
        let rows = task_repo::find_by_trigger_id(&tx, trigger_id)?;
        tx.rollback().await?;
        rows.into_iter().map(TaskInstance::from_row).collect()
    }

    /// Bindings of one task instance with their values, in write order.
    pub async fn find_instance_parameters(
        &self,
        task_instance_id: &str,
    ) -> Result<Vec<(InstanceParameter, Parameter)>, EngineError> {
        let tx = self.pool.begin().await?;
        let bindings = binding_repo::find_by_instance_id(&tx, task_instance_id)?
            .into_iter()
            .map(InstanceParameter::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<String> = bindings.iter().map(|b| b.parameter_id().to_owned()).collect();
        let parameters = load_parameters(&tx, &ids)?;
        tx.rollback().await?;
        Ok(bindings
            .into_iter()
            .filter_map(|b| {
                let parameter = parameters.get(b.parameter_id())?.clone();
                Some((b, parameter))
            })
            .collect())
    }

    pub async fn find_workflow_instance(&self, trigger_id: &str) -> Result<WorkflowInstance, EngineError> {
        let tx = self.pool.begin().await?;
        let instance = load_workflow_instance(&tx, trigger_id);
        tx.rollback().await?;
        instance
    }

    // -----------------------------------------------------------------------
    // Deferred waits
    // -----------------------------------------------------------------------

    /// Register a wait on the callback of `business_id`'s attempt running on
    /// `worker_id`.  It resolves on succeed, fail or terminate, or times out
    /// after the configured worker wait timeout.
    pub fn register_wait(&self, worker_id: &str, business_id: &str) -> WorkerWait {
        WorkerWait {
            wait: self.deferred.register(WaitKey::new(worker_id, business_id)),
            timeout: self.config.worker_wait_timeout(),
        }
    }

    /// A dispatch slot, or `None` when no dispatcher is attached.
    fn reserve_dispatch(&self) -> Result<Option<DispatchPermit<'_, TaskDispatch>>, queue::QueueError> {
        self.dispatcher.as_ref().map(DispatchSender::reserve).transpose()
    }

    async fn node_definition(&self, node_type: &str) -> Result<NodeDef, EngineError> {
        self.catalog.get_by_type(node_type).await.map_err(|e| match e {
            CatalogError::NotFound(node_type) => EngineError::not_found("node definition", node_type),
            other => other.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Transaction-scoped helpers
// ---------------------------------------------------------------------------

pub(crate) fn load_workflow(tx: &Transaction, workflow_ref: &str, version: &str) -> Result<Workflow, EngineError> {
    let row = workflow_repo::find_by_ref_and_version(tx, workflow_ref, version)?
        .ok_or_else(|| EngineError::not_found("workflow", format!("{workflow_ref}@{version}")))?;
    Workflow::from_row(row)
}

pub(crate) fn load_workflow_instance(tx: &Transaction, trigger_id: &str) -> Result<WorkflowInstance, EngineError> {
    let row = instance_repo::find_by_trigger_id(tx, trigger_id)?
        .ok_or_else(|| EngineError::not_found("workflow instance", trigger_id))?;
    WorkflowInstance::from_row(row)
}

fn load_task(tx: &Transaction, task_instance_id: &str) -> Result<TaskInstance, EngineError> {
    let row = task_repo::find_by_id(tx, task_instance_id)?
        .ok_or_else(|| EngineError::not_found("task instance", task_instance_id))?;
    TaskInstance::from_row(row)
}

/// Scope for one activation: globals, then trigger parameters, then the
/// latest committed outputs of this run under both aliases.
fn build_scope(tx: &Transaction, workflow: &Workflow, trigger_id: &str) -> Result<ScopeContext, EngineError> {
    let mut context = ScopeContext::new();
    for (name, parameter) in workflow.global_parameter_values()? {
        context.add(GLOBAL_SCOPE, &name, parameter)?;
    }
    for (name, parameter) in load_trigger_parameters(tx, trigger_id)? {
        context.add(TRIGGER_SCOPE, &name, parameter)?;
    }

    let outputs = binding_repo::find_last_output_by_trigger_id(tx, trigger_id)?;
    let ids: Vec<String> = outputs.iter().map(|row| row.parameter_id.clone()).collect();
    let parameters = load_parameters(tx, &ids)?;
    for row in outputs {
        let parameter = parameters
            .get(&row.parameter_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("parameter", row.parameter_id.as_str()))?;
        context.add_output(&row.workflow_type, &row.async_task_ref, &row.ref_name, parameter)?;
    }
    debug!("scope built with {} entries", context.len());
    Ok(context)
}

/// Input values handed to the dispatcher: new parameters as computed,
/// defaults loaded from the store.
fn resolve_inputs(tx: &Transaction, inputs: &BoundParameters) -> Result<HashMap<String, Parameter>, EngineError> {
    let computed: HashSet<&str> = inputs.parameters.iter().map(Parameter::id).collect();
    let defaults: Vec<String> = inputs
        .bindings
        .iter()
        .filter(|b| !computed.contains(b.parameter_id()))
        .map(|b| b.parameter_id().to_owned())
        .collect();
    let defaults = load_parameters(tx, &defaults)?;
    let by_id: HashMap<&str, &Parameter> = inputs
        .parameters
        .iter()
        .map(|p| (p.id(), p))
        .chain(defaults.iter().map(|(id, p)| (id.as_str(), p)))
        .collect();

    Ok(inputs
        .bindings
        .iter()
        .filter_map(|b| {
            let parameter = by_id.get(b.parameter_id())?;
            Some((b.ref_name().to_owned(), (*parameter).clone()))
        })
        .collect())
}

/// Store a new attempt that failed before reaching a worker.
fn store_failed(tx: &mut Transaction, task: &mut TaskInstance, workflow_type: WorkflowType) -> Result<(), EngineError> {
    task.execute_failed()?;
    persist_bound(tx, &inner_outputs(task, workflow_type)?)?;
    task_repo::insert(tx, task.to_row()?)?;
    Ok(())
}

/// Parameters first, then the bindings that reference them.
fn persist_bound(tx: &mut Transaction, bound: &BoundParameters) -> Result<(), EngineError> {
    save_parameters(tx, &bound.parameters)?;
    binding_repo::insert_all(tx, bound.bindings.iter().map(|b| b.to_row()).collect())?;
    Ok(())
}

/// Move the workflow instance when a volume task reaches a terminal state.
fn apply_volume_effects(tx: &mut Transaction, task: &TaskInstance) -> Result<(), EngineError> {
    if !task.is_volume() {
        return Ok(());
    }
    let mut instance = load_workflow_instance(tx, task.trigger_id())?;
    let before = instance.status();
    match (task.is_creation_volume(), task.status()) {
        (true, _) if before.is_terminal() => {
            debug!("run '{}' already {}, start volume leaves it as is", task.trigger_id(), before);
        }
        (true, TaskStatus::Succeeded) => instance.start()?,
        (true, _) => instance.terminate_in_start()?,
        (false, TaskStatus::Succeeded) if before == ProcessStatus::Running => instance.finish()?,
        (false, TaskStatus::Succeeded) => {}
        (false, _) => {
            warn!("cleanup of run '{}' failed", task.trigger_id());
            if !before.is_terminal() {
                instance.terminate()?;
            }
        }
    }
    if instance.status() != before {
        instance_repo::update_status(tx, &instance.to_row())?;
        info!("workflow instance {} moved {} -> {}", instance.id(), before, instance.status());
    }
    Ok(())
}
