// Storage seams. Every collaborator the engine touches sits behind one of
// these traits so executions can run against Postgres in production and
// in-memory stores in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    ActivityEntry, Client, ClientStatus, Communication, Document, DocumentStatus, LoanScenario,
    MessageTemplate, Note, Notification, Task, User,
};
use crate::workflows::engine::{
    ExecutionStatus, WaitContinuation, WorkflowDefinition, WorkflowExecution, WorkflowExecutionLog,
};
use crate::workflows::triggers::TriggerType;

pub mod postgres;

#[cfg(test)]
pub mod memory;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored data corrupt: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Client, StoreError>;
    async fn update_status(&self, id: Uuid, status: ClientStatus) -> Result<(), StoreError>;
    /// Returns false when the tag was already present.
    async fn add_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError>;
    /// Returns false when the tag was not present.
    async fn remove_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError>;
    async fn assign_owner(&self, id: Uuid, owner_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Document>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Document, StoreError>;
    async fn insert(&self, document: Document) -> Result<(), StoreError>;
    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Task>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Task, StoreError>;
    async fn insert(&self, task: Task) -> Result<(), StoreError>;
    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn assign(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError>;
    /// Incomplete tasks whose due date has passed.
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;
    /// Incomplete tasks due inside the window.
    async fn find_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Note>, StoreError>;
    async fn insert(&self, note: Note) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LoanScenarioStore: Send + Sync {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<LoanScenario>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<User, StoreError>;
    async fn first_active_with_role(&self, role: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<MessageTemplate, StoreError>;
}

#[async_trait]
pub trait CommunicationStore: Send + Sync {
    async fn insert(&self, communication: Communication) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<WorkflowDefinition>, StoreError>;
    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError>;
    async fn list_all(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert(&self, execution: WorkflowExecution) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<WorkflowExecution, StoreError>;
    async fn set_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError>;
    async fn set_current_step(&self, id: Uuid, step_index: usize) -> Result<(), StoreError>;
    async fn append_log(&self, log: WorkflowExecutionLog) -> Result<(), StoreError>;
    async fn logs_for(&self, execution_id: Uuid) -> Result<Vec<WorkflowExecutionLog>, StoreError>;
    async fn save_continuation(&self, continuation: WaitContinuation) -> Result<(), StoreError>;
    async fn get_continuation(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WaitContinuation>, StoreError>;
    async fn delete_continuation(&self, execution_id: Uuid) -> Result<(), StoreError>;
    /// Continuations whose resume time has passed.
    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitContinuation>, StoreError>;
}

/// Bundle of store handles threaded through the engine and handlers.
#[derive(Clone)]
pub struct Stores {
    pub clients: Arc<dyn ClientStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub notes: Arc<dyn NoteStore>,
    pub loan_scenarios: Arc<dyn LoanScenarioStore>,
    pub users: Arc<dyn UserStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub communications: Arc<dyn CommunicationStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub activity: Arc<dyn ActivityStore>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub executions: Arc<dyn ExecutionStore>,
}
