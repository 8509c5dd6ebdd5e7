// Workflow engine - owns the execution lifecycle. Definitions are matched by
// the trigger handler; the engine runs their step lists and persists every
// state change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{ActionOutcome, ActionStep, ValidationError};
use super::conditions::{self, Condition, Evaluation};
use super::context::EvaluationContext;
use super::executor::{ActionExecutor, ExecutionMode, StepEffect};
use super::triggers::TriggerType;
use crate::store::{StoreError, Stores};

/// Lifecycle states of one workflow execution.
///
/// Terminal states (COMPLETED, FAILED, CANCELLED, SKIPPED) are frozen; the
/// only re-entrant edge is WAITING back to RUNNING.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }

    pub fn can_transition(&self, next: ExecutionStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::Waiting | Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
            ),
            Self::Waiting => matches!(next, Self::Running | Self::Cancelled),
            _ => false,
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "WAITING" => Ok(Self::Waiting),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

/// What a failed step (without continue_on_error) does to the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop immediately and mark the execution FAILED.
    #[default]
    Abort,
    /// Log the failure and keep running later steps.
    Continue,
}

/// How a run that reached the end with logged failures finishes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Finish COMPLETED even when some continued-past steps failed.
    #[default]
    CompleteWithFailures,
    /// Finish FAILED when any step failed along the way.
    FailOnAnyFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub condition: Option<Condition>,
    pub actions: Vec<ActionStep>,
    pub is_active: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub completion_mode: CompletionMode,
    pub owner: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One run of one definition against one context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// The serialized EvaluationContext this run evaluates against. Written
    /// once at start and reloaded on resume, never refreshed.
    pub context_snapshot: serde_json::Value,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Durable record of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_index: usize,
    pub action_type: String,
    pub success: bool,
    pub message: String,
    pub side_effect_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Where a suspended execution picks back up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitContinuation {
    pub execution_id: Uuid,
    pub resume_at: DateTime<Utc>,
    pub resume_at_step_index: usize,
    /// The steps still to run, including any spliced in by a branch before
    /// the wait.
    pub remaining: Vec<ActionStep>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow configuration invalid: {0}")]
    Configuration(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("context snapshot corrupt: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Dry-run report produced by `test_workflow`.
#[derive(Debug)]
pub struct TestReport {
    pub condition: Evaluation,
    /// (step name, action type, outcome) for each step a live run would hit.
    pub steps: Vec<(String, &'static str, ActionOutcome)>,
}

enum RunEnd {
    Finished { any_failed: bool },
    Suspended,
    Aborted(String),
    Cancelled,
}

pub struct WorkflowEngine {
    stores: Stores,
    executor: ActionExecutor,
}

impl WorkflowEngine {
    pub fn new(stores: Stores, executor: ActionExecutor) -> Self {
        Self { stores, executor }
    }

    /// Start one execution of a definition against a context snapshot.
    ///
    /// A definition whose condition does not match still produces an
    /// execution row, marked SKIPPED with no step logs.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        context: EvaluationContext,
    ) -> Result<Uuid, EngineError> {
        for step in &definition.actions {
            step.validate()?;
        }

        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id: definition.id,
            context_snapshot: serde_json::to_value(&context)?,
            status: ExecutionStatus::Pending,
            current_step_index: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        let execution_id = execution.id;
        self.stores.executions.insert(execution).await?;

        // The run enters RUNNING before the condition is evaluated; a
        // non-match exits RUNNING into SKIPPED.
        self.transition(execution_id, ExecutionStatus::Running, None)
            .await?;

        if let Some(condition) = &definition.condition {
            let evaluation = conditions::evaluate(condition, &context);
            if !evaluation.matched {
                info!(
                    workflow = %definition.name,
                    detail = %evaluation.detail,
                    "Condition not met, skipping"
                );
                self.finish(execution_id, ExecutionStatus::Skipped, Some(evaluation.detail))
                    .await?;
                return Ok(execution_id);
            }
        }

        let queue: VecDeque<ActionStep> = definition.actions.iter().cloned().collect();
        let end = self
            .run_steps(definition, execution_id, &context, queue, 0)
            .await?;
        self.apply_run_end(definition, execution_id, end).await?;

        Ok(execution_id)
    }

    /// Run queued steps until the queue drains, a wait suspends the run, a
    /// failure aborts it, or a cancel lands.
    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        execution_id: Uuid,
        ctx: &EvaluationContext,
        mut queue: VecDeque<ActionStep>,
        start_index: usize,
    ) -> Result<RunEnd, EngineError> {
        let mut step_index = start_index;
        let mut any_failed = false;

        while let Some(step) = queue.pop_front() {
            // A cancel issued while the run is in flight wins before the
            // next step dispatches.
            let current = self.stores.executions.get(execution_id).await?;
            if current.status == ExecutionStatus::Cancelled {
                return Ok(RunEnd::Cancelled);
            }

            self.stores
                .executions
                .set_current_step(execution_id, step_index)
                .await?;

            let effect = self
                .executor
                .execute_step(&step, ctx, definition.owner, ExecutionMode::Live)
                .await;

            match effect {
                StepEffect::Done(outcome) => {
                    self.log_step(execution_id, step_index, &step, &outcome)
                        .await?;
                    if !outcome.success {
                        any_failed = true;
                        if !step.continue_on_error {
                            match definition.failure_policy {
                                FailurePolicy::Abort => {
                                    return Ok(RunEnd::Aborted(format!(
                                        "step '{}' failed: {}",
                                        step.name, outcome.message
                                    )));
                                }
                                FailurePolicy::Continue => {
                                    warn!(
                                        step = %step.name,
                                        "Step failed, continuing: {}",
                                        outcome.message
                                    );
                                }
                            }
                        }
                    }
                    step_index += 1;
                }
                StepEffect::Splice { outcome, actions } => {
                    self.log_step(execution_id, step_index, &step, &outcome)
                        .await?;
                    for action in actions.into_iter().rev() {
                        queue.push_front(action);
                    }
                    step_index += 1;
                }
                StepEffect::Suspend { outcome, resume_at } => {
                    self.log_step(execution_id, step_index, &step, &outcome)
                        .await?;
                    let continuation = WaitContinuation {
                        execution_id,
                        resume_at,
                        resume_at_step_index: step_index + 1,
                        remaining: queue.into_iter().collect(),
                    };
                    self.stores.executions.save_continuation(continuation).await?;
                    self.transition(execution_id, ExecutionStatus::Waiting, None)
                        .await?;
                    info!(
                        execution = %execution_id,
                        resume_at = %resume_at,
                        "Execution suspended"
                    );
                    return Ok(RunEnd::Suspended);
                }
            }
        }

        Ok(RunEnd::Finished { any_failed })
    }

    async fn apply_run_end(
        &self,
        definition: &WorkflowDefinition,
        execution_id: Uuid,
        end: RunEnd,
    ) -> Result<(), EngineError> {
        match end {
            RunEnd::Finished { any_failed } => {
                let status = if any_failed
                    && definition.completion_mode == CompletionMode::FailOnAnyFailure
                {
                    ExecutionStatus::Failed
                } else {
                    ExecutionStatus::Completed
                };
                let error = (status == ExecutionStatus::Failed)
                    .then(|| "one or more steps failed".to_string());
                self.finish(execution_id, status, error).await?;
            }
            RunEnd::Aborted(message) => {
                self.finish(execution_id, ExecutionStatus::Failed, Some(message))
                    .await?;
            }
            RunEnd::Suspended | RunEnd::Cancelled => {}
        }
        Ok(())
    }

    /// All status writes funnel through here so every persisted edge obeys
    /// `ExecutionStatus::can_transition`.
    async fn transition(
        &self,
        execution_id: Uuid,
        next: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let current = self.stores.executions.get(execution_id).await?.status;
        if !current.can_transition(next) {
            return Err(EngineError::Validation(format!(
                "illegal status transition {} -> {}",
                current.as_str(),
                next.as_str()
            )));
        }
        self.stores
            .executions
            .set_status(execution_id, next, error)
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        self.transition(execution_id, status, error).await?;
        info!(execution = %execution_id, status = status.as_str(), "Execution finished");
        Ok(())
    }

    async fn log_step(
        &self,
        execution_id: Uuid,
        step_index: usize,
        step: &ActionStep,
        outcome: &ActionOutcome,
    ) -> Result<(), EngineError> {
        self.stores
            .executions
            .append_log(WorkflowExecutionLog {
                id: Uuid::new_v4(),
                execution_id,
                step_index,
                action_type: step.spec.action_type().to_string(),
                success: outcome.success,
                message: outcome.message.clone(),
                side_effect_ids: outcome.side_effect_ids.clone(),
                created_at: Utc::now(),
            })
            .await?;

        // Parallel children get their own entries at the parent's index.
        for (name, child) in &outcome.children {
            self.stores
                .executions
                .append_log(WorkflowExecutionLog {
                    id: Uuid::new_v4(),
                    execution_id,
                    step_index,
                    action_type: format!("PARALLEL:{}", name),
                    success: child.success,
                    message: child.message.clone(),
                    side_effect_ids: child.side_effect_ids.clone(),
                    created_at: Utc::now(),
                })
                .await?;
        }

        Ok(())
    }

    /// Resume a WAITING execution from its stored continuation, evaluating
    /// against the snapshot taken when the run started.
    pub async fn resume_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let execution = self.stores.executions.get(execution_id).await?;
        if execution.status != ExecutionStatus::Waiting {
            return Err(EngineError::Validation(format!(
                "execution is {}, only WAITING executions resume",
                execution.status.as_str()
            )));
        }

        let continuation = self
            .stores
            .executions
            .get_continuation(execution_id)
            .await?
            .ok_or(EngineError::NotFound("continuation"))?;

        let definition = self
            .stores
            .workflows
            .get(execution.workflow_id)
            .await?;
        let context: EvaluationContext = serde_json::from_value(execution.context_snapshot)?;

        self.transition(execution_id, ExecutionStatus::Running, None)
            .await?;
        self.stores.executions.delete_continuation(execution_id).await?;

        let queue: VecDeque<ActionStep> = continuation.remaining.into_iter().collect();
        let end = self
            .run_steps(
                &definition,
                execution_id,
                &context,
                queue,
                continuation.resume_at_step_index,
            )
            .await?;
        self.apply_run_end(&definition, execution_id, end).await
    }

    /// Cancel an execution that has not reached a terminal state.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let execution = self.stores.executions.get(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "execution already {}",
                execution.status.as_str()
            )));
        }

        self.transition(execution_id, ExecutionStatus::Cancelled, None)
            .await?;
        self.stores.executions.delete_continuation(execution_id).await?;
        info!(execution = %execution_id, "Execution cancelled");
        Ok(())
    }

    /// Dry-run a definition against a context: evaluates the condition and
    /// walks every step without writing anything. Waits are noted and
    /// skipped so the full step list is visible in one pass.
    pub async fn test_workflow(
        &self,
        definition: &WorkflowDefinition,
        context: &EvaluationContext,
    ) -> Result<TestReport, EngineError> {
        for step in &definition.actions {
            step.validate()?;
        }

        let condition = match &definition.condition {
            Some(condition) => conditions::evaluate(condition, context),
            None => Evaluation {
                matched: true,
                detail: "no condition configured".to_string(),
            },
        };

        let mut steps = Vec::new();
        if condition.matched {
            let mut queue: VecDeque<ActionStep> = definition.actions.iter().cloned().collect();
            while let Some(step) = queue.pop_front() {
                let effect = self
                    .executor
                    .execute_step(&step, context, definition.owner, ExecutionMode::DryRun)
                    .await;
                match effect {
                    StepEffect::Done(outcome) => {
                        steps.push((step.name.clone(), step.spec.action_type(), outcome));
                    }
                    StepEffect::Splice { outcome, actions } => {
                        steps.push((step.name.clone(), step.spec.action_type(), outcome));
                        for action in actions.into_iter().rev() {
                            queue.push_front(action);
                        }
                    }
                    StepEffect::Suspend { outcome, .. } => {
                        steps.push((step.name.clone(), step.spec.action_type(), outcome));
                    }
                }
            }
        }

        Ok(TestReport { condition, steps })
    }

    pub async fn execution_logs(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<WorkflowExecutionLog>, EngineError> {
        Ok(self.stores.executions.logs_for(execution_id).await?)
    }
}
