//! End-to-end tests for activation, completion and termination.

use std::time::Duration;

use serde_json::json;

use crate::binder::{INNER_END_TIME, INNER_EXECUTION_STATUS, INNER_START_TIME};
use crate::test_support::{Harness, WORKFLOW_REF, WORKFLOW_VERSION};
use crate::trigger::{ManualParameter, TriggerSource};
use crate::workflow_instance::ProcessStatus;
use crate::{EngineError, InstanceParameterKind, TaskStatus};

const INNER_REFS: [&str; 3] = [INNER_END_TIME, INNER_EXECUTION_STATUS, INNER_START_TIME];

fn refs(bound: &[(String, String)]) -> Vec<&str> {
    bound.iter().map(|(r, _)| r.as_str()).collect()
}

// ------------------------------------------------------------------
// activate
// ------------------------------------------------------------------

#[tokio::test]
async fn trigger_parameter_flows_into_node_input() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();

    assert_eq!(build.status(), TaskStatus::Waiting);
    assert_eq!(build.serial_no(), 1);
    assert_eq!(build.node_info().worker_type.as_deref(), Some("DOCKER"));
    // One binding per declared input: the computed target plus the default branch.
    assert_eq!(
        h.bound(build.id(), InstanceParameterKind::Input).await,
        vec![("branch".into(), "main".into()), ("target".into(), "acme/app".into())]
    );
}

#[tokio::test]
async fn outputs_resolve_under_both_aliases() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    h.run_to_success(&h.command(&trigger_id, "build"), r#"{"version":"1.2.0"}"#).await;

    let deploy = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "deploy")).await.unwrap();

    assert_eq!(
        h.bound(deploy.id(), InstanceParameterKind::Input).await,
        vec![("image".into(), "acme/app:1.2.0".into()), ("tag".into(), "prod-1.2.0".into())]
    );
}

#[tokio::test]
async fn later_attempt_outputs_shadow_earlier_ones() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.command(&trigger_id, "build");
    h.run_to_success(&build, r#"{"version":"1"}"#).await;
    h.run_to_success(&build, r#"{"version":"2"}"#).await;

    let deploy = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "deploy")).await.unwrap();
    let inputs = h.bound(deploy.id(), InstanceParameterKind::Input).await;
    assert_eq!(inputs[0], ("image".into(), "acme/app:2".into()));
}

#[tokio::test]
async fn unresolvable_input_fails_the_attempt_instead_of_the_call() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    // `build.version` does not exist yet.
    let deploy = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "deploy")).await.unwrap();

    assert_eq!(deploy.status(), TaskStatus::Failed);
    assert!(h.bound(deploy.id(), InstanceParameterKind::Input).await.is_empty());
    assert_eq!(refs(&h.bound(deploy.id(), InstanceParameterKind::Output).await), INNER_REFS);
}

#[tokio::test]
async fn second_attempt_is_refused_while_first_is_in_flight() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let cmd = h.command(&trigger_id, "build");

    let first = h.orchestrator.activate(&h.ctx, &cmd).await.unwrap();
    assert!(matches!(
        h.orchestrator.activate(&h.ctx, &cmd).await,
        Err(EngineError::ConcurrentActivationConflict { business_id }) if business_id == cmd.async_task_instance_id
    ));

    h.orchestrator.mark_running(&h.ctx, first.id(), "w1").await.unwrap();
    assert!(h.orchestrator.activate(&h.ctx, &cmd).await.is_err());

    h.orchestrator.fail(&h.ctx, first.id()).await.unwrap();
    let second = h.orchestrator.activate(&h.ctx, &cmd).await.unwrap();
    assert_eq!(second.serial_no(), 2);
    assert_eq!(second.business_id(), first.business_id());

    h.orchestrator.fail(&h.ctx, second.id()).await.unwrap();
    let third = h.orchestrator.activate(&h.ctx, &cmd).await.unwrap();
    assert_eq!(third.serial_no(), 3);
}

#[tokio::test]
async fn unknown_node_or_trigger_is_not_found() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    assert!(matches!(
        h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "ghost")).await,
        Err(EngineError::NotFound { kind: "node", .. })
    ));
    assert!(matches!(
        h.orchestrator.activate(&h.ctx, &h.command("no-such-trigger", "build")).await,
        Err(EngineError::NotFound { kind: "trigger event", .. })
    ));
}

#[tokio::test]
async fn node_type_missing_from_catalog_is_not_found() {
    let h = Harness::new().await;
    let def: crate::WorkflowDefinition = serde_json::from_value(json!({
        "ref": "lint", "version": "1", "name": "Lint",
        "nodes": [{ "ref": "check", "type": "eslint" }]
    }))
    .unwrap();
    crate::WorkflowRegistry::new(h.pool.clone())
        .register(crate::Workflow::try_from(def).unwrap())
        .await
        .unwrap();
    let trigger = h
        .triggers
        .ingest(&h.ctx, "project-1", "lint", "1", TriggerSource::Webhook { payload: json!({}) })
        .await
        .unwrap();
    let cmd = crate::TaskActivatingCmd {
        node_ref: "check".into(),
        ..trigger.command
    };

    assert!(matches!(
        h.orchestrator.activate(&h.ctx, &cmd).await,
        Err(EngineError::NotFound { kind: "node definition", id }) if id == "eslint"
    ));
}

#[tokio::test]
async fn duplicate_manual_parameters_are_rejected_at_ingestion() {
    let h = Harness::new().await;
    let repo = |value: &str| ManualParameter {
        name: "repo".into(),
        type_name: "STRING".into(),
        value: json!(value),
    };
    let source = TriggerSource::Manual {
        parameters: vec![repo("acme/app"), repo("acme/fork")],
    };

    assert!(matches!(
        h.triggers.ingest(&h.ctx, "project-1", WORKFLOW_REF, WORKFLOW_VERSION, source).await,
        Err(EngineError::InvalidTrigger(_))
    ));
}

#[tokio::test]
async fn full_dispatch_channel_fails_the_attempt() {
    let (tx, mut rx) = queue::dispatch_channel(1);
    let h = Harness::with_dispatcher(tx).await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;

    let first = h.orchestrator.activate(&h.ctx, &start).await.unwrap();
    assert_eq!(first.status(), TaskStatus::Waiting);

    let build = h.command(&start.trigger_id, "build");
    let blocked = h.orchestrator.activate(&h.ctx, &build).await.unwrap();
    assert_eq!(blocked.status(), TaskStatus::Failed);
    assert!(h.bound(blocked.id(), InstanceParameterKind::Input).await.is_empty());
    assert_eq!(refs(&h.bound(blocked.id(), InstanceParameterKind::Output).await), INNER_REFS);

    // Once the dispatcher catches up, the same business id can be retried.
    assert_eq!(rx.recv().await.unwrap().task_instance.id(), first.id());
    let retried = h.orchestrator.activate(&h.ctx, &build).await.unwrap();
    assert_eq!(retried.status(), TaskStatus::Waiting);
    assert_eq!(retried.serial_no(), 2);
    assert_eq!(rx.recv().await.unwrap().task_instance.id(), retried.id());
}

#[tokio::test]
async fn cleanup_is_kept_when_it_cannot_be_dispatched() {
    let (tx, mut rx) = queue::dispatch_channel(1);
    let h = Harness::with_dispatcher(tx).await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;
    h.orchestrator.activate(&h.ctx, &start).await.unwrap();

    let outcome = h.orchestrator.terminate_by_trigger_id(&h.ctx, &start.trigger_id).await.unwrap();

    let end = outcome.synthesized_end.expect("cleanup task");
    assert!(!outcome.end_dispatched);
    assert_eq!(end.status(), TaskStatus::Waiting);
    rx.recv().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn activated_task_is_dispatched_with_its_inputs() {
    let (tx, mut rx) = queue::dispatch_channel(8);
    let h = Harness::with_dispatcher(tx).await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;

    let start_task = h.orchestrator.activate(&h.ctx, &start).await.unwrap();
    let dispatched = rx.recv().await.unwrap();
    assert_eq!(dispatched.task_instance.id(), start_task.id());
    assert!(dispatched.inputs.is_empty());

    h.orchestrator.mark_running(&h.ctx, start_task.id(), "w1").await.unwrap();
    h.orchestrator.succeed(&h.ctx, start_task.id(), "").await.unwrap();

    let build = h.orchestrator.activate(&h.ctx, &h.command(&start.trigger_id, "build")).await.unwrap();
    let dispatched = rx.recv().await.unwrap();
    assert_eq!(dispatched.task_instance.id(), build.id());
    assert_eq!(dispatched.inputs["target"].string_value(), "acme/app");
    assert_eq!(dispatched.inputs["branch"].string_value(), "main");
}

// ------------------------------------------------------------------
// markRunning
// ------------------------------------------------------------------

#[tokio::test]
async fn mark_running_is_idempotent_and_refuses_terminal_instances() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();

    let running = h.orchestrator.mark_running(&h.ctx, build.id(), "w1").await.unwrap();
    assert_eq!(running.status(), TaskStatus::Running);
    let again = h.orchestrator.mark_running(&h.ctx, build.id(), "w2").await.unwrap();
    assert_eq!(again.worker_id(), Some("w1"));
    assert_eq!(h.orchestrator.find_running_tasks().await.unwrap().len(), 1);

    h.orchestrator.fail(&h.ctx, build.id()).await.unwrap();
    assert!(matches!(
        h.orchestrator.mark_running(&h.ctx, build.id(), "w1").await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(h.orchestrator.find_running_tasks().await.unwrap().is_empty());
    assert!(matches!(
        h.orchestrator.mark_running(&h.ctx, "missing", "w1").await,
        Err(EngineError::NotFound { kind: "task instance", .. })
    ));
}

// ------------------------------------------------------------------
// succeed / fail
// ------------------------------------------------------------------

#[tokio::test]
async fn success_records_declared_and_inner_outputs() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    let build = h.run_to_success(&h.command(&trigger_id, "build"), r#"{"version":"1.2.0","noise":true}"#).await;

    assert_eq!(build.status(), TaskStatus::Succeeded);
    let outputs = h.bound(build.id(), InstanceParameterKind::Output).await;
    assert_eq!(
        refs(&outputs),
        vec![INNER_END_TIME, INNER_EXECUTION_STATUS, INNER_START_TIME, "version"]
    );
    assert!(outputs.contains(&(INNER_EXECUTION_STATUS.into(), "SUCCEEDED".into())));
    assert!(outputs.contains(&("version".into(), "1.2.0".into())));
}

#[tokio::test]
async fn empty_result_for_declared_output_fails_the_task() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    let build = h.run_to_success(&h.command(&trigger_id, "build"), "{}").await;

    assert_eq!(build.status(), TaskStatus::Failed);
    let outputs = h.bound(build.id(), InstanceParameterKind::Output).await;
    assert_eq!(refs(&outputs), INNER_REFS);
    assert!(outputs.contains(&(INNER_EXECUTION_STATUS.into(), "FAILED".into())));
}

#[tokio::test]
async fn node_without_declared_outputs_ignores_payload() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    h.run_to_success(&h.command(&trigger_id, "build"), r#"{"version":"3"}"#).await;

    let deploy = h.run_to_success(&h.command(&trigger_id, "deploy"), "not json at all").await;
    assert_eq!(deploy.status(), TaskStatus::Succeeded);
}

#[tokio::test]
async fn succeed_requires_a_running_instance() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();

    assert!(matches!(
        h.orchestrator.succeed(&h.ctx, build.id(), r#"{"version":"1"}"#).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    // Nothing was written.
    assert!(h.bound(build.id(), InstanceParameterKind::Output).await.is_empty());

    // A waiting attempt can still fail directly.
    let failed = h.orchestrator.fail(&h.ctx, build.id()).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert!(matches!(
        h.orchestrator.fail(&h.ctx, build.id()).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

// ------------------------------------------------------------------
// volume tasks
// ------------------------------------------------------------------

#[tokio::test]
async fn start_volume_moves_the_workflow_instance() {
    let h = Harness::new().await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;
    let instance = h.orchestrator.find_workflow_instance(&start.trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Init);

    h.run_to_success(&start, "").await;
    let instance = h.orchestrator.find_workflow_instance(&start.trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Running);
}

#[tokio::test]
async fn failed_start_terminates_the_run() {
    let h = Harness::new().await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;
    let task = h.orchestrator.activate(&h.ctx, &start).await.unwrap();

    h.orchestrator.fail(&h.ctx, task.id()).await.unwrap();

    let instance = h.orchestrator.find_workflow_instance(&start.trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Terminated);
    assert!(instance.end_time().is_some());
}

#[tokio::test]
async fn end_volume_finishes_the_run_and_releases_callbacks() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    h.orchestrator.callbacks().register(trigger_id.as_str(), "log-tail");
    h.run_to_success(&h.command(&trigger_id, "build"), r#"{"version":"1"}"#).await;
    h.run_to_success(&h.command(&trigger_id, "deploy"), "").await;

    let commands = h.orchestrator.next_commands(&h.ctx, &trigger_id).await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].node_ref, "end");
    let end = h.run_to_success(&commands[0], "").await;

    assert!(end.is_deletion_volume());
    assert_eq!(h.orchestrator.callbacks().registered(&trigger_id), 0);
    let instance = h.orchestrator.find_workflow_instance(&trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Finished);
    assert!(h.orchestrator.next_commands(&h.ctx, &trigger_id).await.unwrap().is_empty());
}

// ------------------------------------------------------------------
// terminate
// ------------------------------------------------------------------

#[tokio::test]
async fn terminating_a_waiting_run_synthesizes_cleanup() {
    let h = Harness::new().await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;
    let waiting = h.orchestrator.activate(&h.ctx, &start).await.unwrap();

    let outcome = h.orchestrator.terminate_by_trigger_id(&h.ctx, &start.trigger_id).await.unwrap();

    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].id(), waiting.id());
    assert_eq!(outcome.failed[0].status(), TaskStatus::Failed);
    assert_eq!(refs(&h.bound(waiting.id(), InstanceParameterKind::Output).await), INNER_REFS);

    let end = outcome.synthesized_end.expect("cleanup task");
    assert!(end.is_deletion_volume());
    assert_eq!(end.status(), TaskStatus::Waiting);

    let tasks = h.orchestrator.find_tasks_by_trigger_id(&start.trigger_id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    let instance = h.orchestrator.find_workflow_instance(&start.trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Terminated);
}

#[tokio::test]
async fn running_work_defers_cleanup_to_the_scheduler() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();
    h.orchestrator.mark_running(&h.ctx, build.id(), "w1").await.unwrap();

    let outcome = h.orchestrator.terminate_by_trigger_id(&h.ctx, &trigger_id).await.unwrap();
    assert!(outcome.failed.is_empty());
    assert!(outcome.synthesized_end.is_none());
    assert!(h.orchestrator.next_commands(&h.ctx, &trigger_id).await.unwrap().is_empty());

    h.orchestrator.fail(&h.ctx, build.id()).await.unwrap();
    let commands = h.orchestrator.next_commands(&h.ctx, &trigger_id).await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].node_ref, "end");
}

#[tokio::test]
async fn existing_cleanup_is_not_duplicated() {
    let h = Harness::new().await;
    let start = h.trigger(json!({ "repo": "acme/app" })).await;
    h.orchestrator.activate(&h.ctx, &start).await.unwrap();

    let first = h.orchestrator.terminate_by_trigger_id(&h.ctx, &start.trigger_id).await.unwrap();
    let end = first.synthesized_end.expect("cleanup task");
    let second = h.orchestrator.terminate_by_trigger_id(&h.ctx, &start.trigger_id).await.unwrap();

    assert!(second.synthesized_end.is_none());
    assert!(second.failed.is_empty());
    // The pending cleanup survives and can still run.
    let running = h.orchestrator.mark_running(&h.ctx, end.id(), "w1").await.unwrap();
    assert_eq!(running.status(), TaskStatus::Running);
}

#[tokio::test]
async fn terminate_fails_waiting_nodes_but_keeps_waiting_cleanup() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();
    let other = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();
    let end = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "end")).await.unwrap();

    let outcome = h.orchestrator.terminate_by_trigger_id(&h.ctx, &trigger_id).await.unwrap();

    let mut failed: Vec<&str> = outcome.failed.iter().map(|t| t.id()).collect();
    failed.sort();
    let mut expected = vec![build.id(), other.id()];
    expected.sort();
    assert_eq!(failed, expected);
    assert!(outcome.synthesized_end.is_none());

    let tasks = h.orchestrator.find_tasks_by_trigger_id(&trigger_id).await.unwrap();
    let end = tasks.iter().find(|t| t.id() == end.id()).unwrap();
    assert_eq!(end.status(), TaskStatus::Waiting);
}

#[tokio::test]
async fn start_finishing_after_terminate_leaves_the_run_terminated() {
    for succeeded in [true, false] {
        let h = Harness::new().await;
        let start = h.trigger(json!({ "repo": "acme/app" })).await;
        let task = h.orchestrator.activate(&h.ctx, &start).await.unwrap();
        h.orchestrator.mark_running(&h.ctx, task.id(), "w1").await.unwrap();

        let outcome = h.orchestrator.terminate_by_trigger_id(&h.ctx, &start.trigger_id).await.unwrap();
        assert!(outcome.synthesized_end.is_none());

        let finished = if succeeded {
            h.orchestrator.succeed(&h.ctx, task.id(), "").await.unwrap()
        } else {
            h.orchestrator.fail(&h.ctx, task.id()).await.unwrap()
        };
        assert!(finished.status().is_terminal());
        let instance = h.orchestrator.find_workflow_instance(&start.trigger_id).await.unwrap();
        assert_eq!(instance.status(), ProcessStatus::Terminated);

        // Nothing is in flight any more, so cleanup is scheduled.
        let commands = h.orchestrator.next_commands(&h.ctx, &start.trigger_id).await.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].node_ref, "end");
        let end = h.run_to_success(&commands[0], "").await;
        assert_eq!(end.status(), TaskStatus::Succeeded);
    }
}

// ------------------------------------------------------------------
// deferred waits
// ------------------------------------------------------------------

#[tokio::test]
async fn completion_resolves_the_worker_wait() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();
    h.orchestrator.mark_running(&h.ctx, build.id(), "w1").await.unwrap();
    let wait = h.orchestrator.register_wait("w1", build.business_id());

    h.orchestrator.succeed(&h.ctx, build.id(), r#"{"version":"1"}"#).await.unwrap();

    assert_eq!(wait.outcome().await.unwrap(), queue::WaitOutcome::Succeeded);
    // Already resolved: terminate finds nothing.
    assert!(!h.orchestrator.terminate(&h.ctx, build.business_id()).await.unwrap());
}

#[tokio::test]
async fn terminate_cancels_the_outstanding_wait() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;
    let build = h.orchestrator.activate(&h.ctx, &h.command(&trigger_id, "build")).await.unwrap();
    h.orchestrator.mark_running(&h.ctx, build.id(), "w1").await.unwrap();
    let wait = h.orchestrator.register_wait("w1", build.business_id());

    assert!(h.orchestrator.terminate(&h.ctx, build.business_id()).await.unwrap());
    assert_eq!(wait.outcome().await.unwrap(), queue::WaitOutcome::Terminated);

    // Best effort: the instance itself is still running.
    assert_eq!(h.orchestrator.find_running_tasks().await.unwrap().len(), 1);
    assert!(matches!(
        h.orchestrator.terminate(&h.ctx, "no-such-business").await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn unresolved_wait_times_out() {
    let h = Harness::new().await;
    let wait = h.orchestrator.register_wait("w1", "biz");
    let timeout = Duration::from_secs(h.orchestrator.config().worker_wait_timeout_secs);
    assert!(matches!(
        wait.outcome().await,
        Err(EngineError::Queue(queue::QueueError::TimedOut(t))) if t == timeout
    ));
}

// ------------------------------------------------------------------
// whole run
// ------------------------------------------------------------------

#[tokio::test]
async fn scheduler_drives_a_run_to_completion() {
    let h = Harness::new().await;
    let trigger_id = h.started_run().await;

    let mut order = Vec::new();
    loop {
        let commands = h.orchestrator.next_commands(&h.ctx, &trigger_id).await.unwrap();
        if commands.is_empty() {
            break;
        }
        for cmd in commands {
            order.push(cmd.node_ref.clone());
            h.run_to_success(&cmd, r#"{"version":"9"}"#).await;
        }
    }

    assert_eq!(order, vec!["build", "deploy", "end"]);
    let instance = h.orchestrator.find_workflow_instance(&trigger_id).await.unwrap();
    assert_eq!(instance.status(), ProcessStatus::Finished);
}
