// Workflow automation engine: triggers match events to definitions, a
// condition tree gates each run, and the executor applies the step list.

pub mod actions;
pub mod conditions;
pub mod context;
pub mod engine;
pub mod executor;
pub mod triggers;

pub use actions::{ActionOutcome, ActionSpec, ActionStep, ParallelPolicy};
pub use conditions::{Condition, ConditionRule, ConditionType, Evaluation};
pub use context::EvaluationContext;
pub use engine::{
    CompletionMode, EngineError, ExecutionStatus, FailurePolicy, TestReport, WaitContinuation,
    WorkflowDefinition, WorkflowEngine, WorkflowExecution, WorkflowExecutionLog,
};
pub use executor::{ActionExecutor, ExecutionMode};
pub use triggers::{ScanResult, TriggerHandler, TriggerPayload, TriggerType};
