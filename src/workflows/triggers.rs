// Workflow triggers - typed domain events and the handler that matches them
// against stored definitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::context::EvaluationContext;
use super::engine::{EngineError, WorkflowEngine};
use crate::store::Stores;

/// Types of events that can activate workflow definitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    // Client triggers
    ClientCreated,
    ClientUpdated,
    ClientStatusChanged,
    ClientInactivity,

    // Pipeline triggers
    PipelineStageEntry,
    PipelineStageExit,
    TimeInStageThreshold,

    // Document triggers
    DocumentUploaded,
    DocumentStatusChanged,
    DocumentDueDate,
    DocumentExpired,

    // Task triggers
    TaskCreated,
    TaskCompleted,
    TaskAssigned,
    TaskDue,
    TaskOverdue,

    // Note triggers
    NoteCreated,
    NoteWithTag,

    // System triggers
    Scheduled,
    DateBased,
    Manual,
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCreated => "CLIENT_CREATED",
            Self::ClientUpdated => "CLIENT_UPDATED",
            Self::ClientStatusChanged => "CLIENT_STATUS_CHANGED",
            Self::ClientInactivity => "CLIENT_INACTIVITY",
            Self::PipelineStageEntry => "PIPELINE_STAGE_ENTRY",
            Self::PipelineStageExit => "PIPELINE_STAGE_EXIT",
            Self::TimeInStageThreshold => "TIME_IN_STAGE_THRESHOLD",
            Self::DocumentUploaded => "DOCUMENT_UPLOADED",
            Self::DocumentStatusChanged => "DOCUMENT_STATUS_CHANGED",
            Self::DocumentDueDate => "DOCUMENT_DUE_DATE",
            Self::DocumentExpired => "DOCUMENT_EXPIRED",
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::TaskAssigned => "TASK_ASSIGNED",
            Self::TaskDue => "TASK_DUE",
            Self::TaskOverdue => "TASK_OVERDUE",
            Self::NoteCreated => "NOTE_CREATED",
            Self::NoteWithTag => "NOTE_WITH_TAG",
            Self::Scheduled => "SCHEDULED",
            Self::DateBased => "DATE_BASED",
            Self::Manual => "MANUAL",
            Self::Webhook => "WEBHOOK",
        }
    }

    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            Self::TaskCreated | Self::TaskCompleted | Self::TaskAssigned | Self::TaskDue | Self::TaskOverdue
        )
    }

    pub fn is_document_scoped(&self) -> bool {
        matches!(
            self,
            Self::DocumentUploaded
                | Self::DocumentStatusChanged
                | Self::DocumentDueDate
                | Self::DocumentExpired
        )
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown trigger type: {}", s))
    }
}

/// Payload reported alongside a trigger. `entity_id` names the record the
/// event was about; `client_id` names the owning client when the entity is
/// not itself a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub entity_id: Uuid,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl TriggerPayload {
    pub fn for_client(client_id: Uuid) -> Self {
        Self {
            entity_id: client_id,
            client_id: None,
            timestamp: Utc::now(),
            extra: serde_json::Value::Null,
        }
    }

    pub fn for_related(entity_id: Uuid, client_id: Uuid) -> Self {
        Self {
            entity_id,
            client_id: Some(client_id),
            timestamp: Utc::now(),
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// Outcome of one periodic scan pass.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub tasks_scanned: usize,
    pub executions_started: usize,
    pub errors: Vec<String>,
}

/// Matches incoming events to active workflow definitions and hands each
/// match to the engine with a freshly built context.
pub struct TriggerHandler {
    stores: Stores,
    engine: Arc<WorkflowEngine>,
    // Serializes periodic scans so one pass completes before the next starts.
    scan_guard: tokio::sync::Mutex<()>,
}

impl TriggerHandler {
    pub fn new(stores: Stores, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            stores,
            engine,
            scan_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Fire a trigger: one execution per matching active definition.
    ///
    /// Deduplication of repeated calls for the same semantic event is the
    /// caller's responsibility.
    pub async fn fire_trigger(
        &self,
        trigger_type: TriggerType,
        payload: TriggerPayload,
    ) -> Result<Vec<Uuid>, EngineError> {
        let definitions = self.stores.workflows.active_by_trigger(trigger_type).await?;

        info!(
            trigger = trigger_type.as_str(),
            matches = definitions.len(),
            "Processing trigger"
        );

        let mut execution_ids = Vec::new();

        for definition in &definitions {
            // Each execution owns its own snapshot, fetched fresh.
            let context =
                EvaluationContext::build(&self.stores, trigger_type, payload.clone()).await?;

            match self.engine.execute(definition, context).await {
                Ok(execution_id) => {
                    execution_ids.push(execution_id);
                }
                Err(e) => {
                    error!(
                        workflow = %definition.name,
                        "Workflow execution failed to start: {}",
                        e
                    );
                }
            }
        }

        Ok(execution_ids)
    }

    /// Scan for tasks past their due date and fire TASK_OVERDUE per task.
    ///
    /// Scans do not self-deduplicate across intervals: a task still overdue
    /// on the next pass fires again.
    pub async fn check_overdue_tasks(&self) -> Result<ScanResult, EngineError> {
        let _guard = self.scan_guard.lock().await;

        let now = Utc::now();
        let tasks = self.stores.tasks.find_overdue(now).await?;

        let mut result = ScanResult {
            tasks_scanned: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            let payload = TriggerPayload::for_related(task.id, task.client_id);
            match self.fire_trigger(TriggerType::TaskOverdue, payload).await {
                Ok(ids) => result.executions_started += ids.len(),
                Err(e) => result.errors.push(format!("task {}: {}", task.id, e)),
            }
        }

        info!(
            scanned = result.tasks_scanned,
            started = result.executions_started,
            "Overdue task scan completed"
        );

        Ok(result)
    }

    /// Scan for tasks coming due within the window and fire TASK_DUE per task.
    pub async fn check_task_due_dates(&self, days_ahead: i64) -> Result<ScanResult, EngineError> {
        let _guard = self.scan_guard.lock().await;

        let now = Utc::now();
        let horizon = now + Duration::days(days_ahead);
        let tasks = self.stores.tasks.find_due_between(now, horizon).await?;

        let mut result = ScanResult {
            tasks_scanned: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            let payload = TriggerPayload::for_related(task.id, task.client_id);
            match self.fire_trigger(TriggerType::TaskDue, payload).await {
                Ok(ids) => result.executions_started += ids.len(),
                Err(e) => result.errors.push(format!("task {}: {}", task.id, e)),
            }
        }

        info!(
            scanned = result.tasks_scanned,
            started = result.executions_started,
            "Task due-date scan completed"
        );

        Ok(result)
    }
}
