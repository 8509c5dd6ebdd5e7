use serde_json::json;

use crate::models::TaskStatus;
use crate::tests::fixtures::test_env;
use crate::workflows::actions::{
    ActionSpec, ActionStep, BranchConfig, CreateTaskConfig, TagConfig, WaitConfig,
};
use crate::workflows::conditions::{Condition, ConditionRule, ConditionType};
use crate::workflows::engine::{CompletionMode, ExecutionStatus, FailurePolicy};
use crate::workflows::triggers::TriggerType;

fn tag_step(tag: &str) -> ActionStep {
    ActionStep::new(
        &format!("tag {}", tag),
        ActionSpec::AddTag(TagConfig {
            tag: tag.to_string(),
        }),
    )
}

fn failing_step() -> ActionStep {
    // No task is configured and the trigger is not task-scoped.
    ActionStep::new("close task", ActionSpec::CompleteTask { task_id: None })
}

fn task_step(title: &str) -> ActionStep {
    ActionStep::new(
        title,
        ActionSpec::CreateTask(CreateTaskConfig {
            title: title.to_string(),
            description: None,
            assigned_to: None,
            assignee_role: None,
            due_date: None,
            due_days: None,
        }),
    )
}

#[tokio::test]
async fn unmatched_condition_skips_with_no_action_logs() {
    let env = test_env();
    let condition = Condition::rule(
        ConditionRule::new(ConditionType::ClientStatusEquals).with_value(json!("SETTLED")),
    );
    let definition = env.seed_workflow(
        TriggerType::Manual,
        Some(condition),
        vec![task_step("never runs")],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Skipped);
    assert!(env.engine.execution_logs(execution_id).await.unwrap().is_empty());
    assert!(env.handles.tasks.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn skip_enters_running_before_the_skipped_terminal() {
    let env = test_env();
    let condition = Condition::rule(
        ConditionRule::new(ConditionType::ClientStatusEquals).with_value(json!("SETTLED")),
    );
    let definition = env.seed_workflow(
        TriggerType::Manual,
        Some(condition),
        vec![task_step("never runs")],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let history: Vec<ExecutionStatus> = env
        .handles
        .executions
        .status_history
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| *id == execution_id)
        .map(|(_, status)| *status)
        .collect();
    assert_eq!(
        history,
        vec![ExecutionStatus::Running, ExecutionStatus::Skipped]
    );
}

#[tokio::test]
async fn every_persisted_status_edge_is_a_legal_transition() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![
            tag_step("before-wait"),
            ActionStep::new("pause", ActionSpec::Wait(WaitConfig { days: 1, hours: 0 })),
            tag_step("after-wait"),
        ],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();
    env.engine.resume_execution(execution_id).await.unwrap();

    let history: Vec<ExecutionStatus> = env
        .handles
        .executions
        .status_history
        .lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| *id == execution_id)
        .map(|(_, status)| *status)
        .collect();
    assert_eq!(
        history,
        vec![
            ExecutionStatus::Running,
            ExecutionStatus::Waiting,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
        ]
    );

    // Executions start PENDING; every write from there obeys the table.
    let mut previous = ExecutionStatus::Pending;
    for status in history {
        assert!(
            previous.can_transition(status),
            "{} -> {}",
            previous.as_str(),
            status.as_str()
        );
        previous = status;
    }
}

#[tokio::test]
async fn abort_policy_stops_at_first_failure() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![tag_step("step-one"), failing_step(), task_step("never runs")],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.unwrap().contains("close task"));

    let logs = env.engine.execution_logs(execution_id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs[0].success);
    assert!(!logs[1].success);
    // The third step never ran.
    assert!(env.handles.tasks.tasks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn continue_policy_runs_remaining_steps() {
    let env = test_env();
    let mut definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![failing_step(), tag_step("still-ran")],
    );
    definition.failure_policy = FailurePolicy::Continue;

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let clients = env.handles.clients.clients.lock().unwrap();
    assert!(clients.get(&env.client.id).unwrap().has_tag("still-ran"));
}

#[tokio::test]
async fn fail_on_any_failure_marks_completed_run_failed() {
    let env = test_env();
    let mut definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![failing_step(), tag_step("still-ran")],
    );
    definition.failure_policy = FailurePolicy::Continue;
    definition.completion_mode = CompletionMode::FailOnAnyFailure;

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn continue_on_error_step_does_not_abort() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![failing_step().continue_on_error(), tag_step("after")],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn wait_suspends_and_resume_finishes_the_run() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![
            tag_step("before-wait"),
            ActionStep::new("pause", ActionSpec::Wait(WaitConfig { days: 1, hours: 0 })),
            tag_step("after-wait"),
        ],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Waiting);

    let continuation = env
        .stores
        .executions
        .get_continuation(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(continuation.remaining.len(), 1);
    assert_eq!(continuation.resume_at_step_index, 2);

    {
        let clients = env.handles.clients.clients.lock().unwrap();
        let client = clients.get(&env.client.id).unwrap();
        assert!(client.has_tag("before-wait"));
        assert!(!client.has_tag("after-wait"));
    }

    env.engine.resume_execution(execution_id).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(env
        .stores
        .executions
        .get_continuation(execution_id)
        .await
        .unwrap()
        .is_none());

    let clients = env.handles.clients.clients.lock().unwrap();
    assert!(clients.get(&env.client.id).unwrap().has_tag("after-wait"));
}

#[tokio::test]
async fn cancelled_waiting_execution_cannot_resume() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![
            ActionStep::new("pause", ActionSpec::Wait(WaitConfig { days: 1, hours: 0 })),
            tag_step("after-wait"),
        ],
    );

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();
    env.engine.cancel_execution(execution_id).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);

    assert!(env.engine.resume_execution(execution_id).await.is_err());
    let clients = env.handles.clients.clients.lock().unwrap();
    assert!(!clients.get(&env.client.id).unwrap().has_tag("after-wait"));
}

#[tokio::test]
async fn cancel_is_rejected_for_terminal_executions() {
    let env = test_env();
    let definition = env.seed_workflow(TriggerType::Manual, None, vec![tag_step("done")]);

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    assert!(env.engine.cancel_execution(execution_id).await.is_err());
}

#[tokio::test]
async fn branch_splices_the_matching_path() {
    let env = test_env();
    let branch = ActionStep::new(
        "route by status",
        ActionSpec::Branch(Box::new(BranchConfig {
            condition: Condition::rule(
                ConditionRule::new(ConditionType::ClientStatusEquals).with_value(json!("ACTIVE")),
            ),
            then_actions: vec![tag_step("active-path")],
            else_actions: vec![tag_step("other-path")],
        })),
    );
    let definition =
        env.seed_workflow(TriggerType::Manual, None, vec![branch, tag_step("tail")]);

    let ctx = env.context().await;
    let execution_id = env.engine.execute(&definition, ctx).await.unwrap();

    let execution = env.stores.executions.get(execution_id).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let clients = env.handles.clients.clients.lock().unwrap();
    let client = clients.get(&env.client.id).unwrap();
    assert!(client.has_tag("active-path"));
    assert!(!client.has_tag("other-path"));
    assert!(client.has_tag("tail"));
}

#[tokio::test]
async fn dry_run_walks_all_steps_without_writes() {
    let env = test_env();
    env.seed_task("open item", TaskStatus::Todo, Some(5));
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![
            task_step("would create"),
            ActionStep::new("pause", ActionSpec::Wait(WaitConfig { days: 3, hours: 0 })),
            tag_step("would tag"),
        ],
    );

    let ctx = env.context().await;
    let report = env.engine.test_workflow(&definition, &ctx).await.unwrap();

    assert!(report.condition.matched);
    assert_eq!(report.steps.len(), 3);
    assert!(report.steps.iter().all(|(_, _, outcome)| outcome.success));

    // Only the seeded task exists; nothing was written.
    assert_eq!(env.handles.tasks.tasks.lock().unwrap().len(), 1);
    let clients = env.handles.clients.clients.lock().unwrap();
    assert!(!clients.get(&env.client.id).unwrap().has_tag("would tag"));
    assert!(env.handles.executions.executions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_step_configuration_rejects_the_run() {
    let env = test_env();
    let definition = env.seed_workflow(
        TriggerType::Manual,
        None,
        vec![ActionStep::new(
            "bad pause",
            ActionSpec::Wait(WaitConfig { days: 0, hours: 0 }),
        )],
    );

    let ctx = env.context().await;
    assert!(env.engine.execute(&definition, ctx).await.is_err());
    assert!(env.handles.executions.executions.lock().unwrap().is_empty());
}
