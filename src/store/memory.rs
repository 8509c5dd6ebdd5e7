// In-memory store implementations for tests. Same observable behavior as the
// Postgres stores, backed by locked maps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{
    ActivityStore, ClientStore, CommunicationStore, DocumentStore, ExecutionStore,
    LoanScenarioStore, NoteStore, NotificationStore, StoreError, Stores, TaskStore, TemplateStore,
    UserStore, WorkflowStore,
};
use crate::models::{
    ActivityEntry, Client, ClientStatus, Communication, Document, DocumentStatus, LoanScenario,
    MessageTemplate, Note, Notification, Task, TaskStatus, User,
};
use crate::workflows::engine::{
    ExecutionStatus, WaitContinuation, WorkflowDefinition, WorkflowExecution, WorkflowExecutionLog,
};
use crate::workflows::triggers::TriggerType;

#[derive(Default)]
pub struct MemoryClientStore {
    pub clients: Mutex<HashMap<Uuid, Client>>,
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn get(&self, id: Uuid) -> Result<Client, StoreError> {
        self.clients
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("client"))
    }

    async fn update_status(&self, id: Uuid, status: ClientStatus) -> Result<(), StoreError> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients.get_mut(&id).ok_or(StoreError::NotFound("client"))?;
        client.status = status;
        client.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn add_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients.get_mut(&id).ok_or(StoreError::NotFound("client"))?;
        if client.tags.iter().any(|t| t == tag) {
            return Ok(false);
        }
        client.tags.push(tag.to_string());
        Ok(true)
    }

    async fn remove_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients.get_mut(&id).ok_or(StoreError::NotFound("client"))?;
        let before = client.tags.len();
        client.tags.retain(|t| t != tag);
        Ok(client.tags.len() != before)
    }

    async fn assign_owner(&self, id: Uuid, owner_id: Uuid) -> Result<(), StoreError> {
        let mut clients = self.clients.lock().unwrap();
        let client = clients.get_mut(&id).ok_or(StoreError::NotFound("client"))?;
        client.owner_id = Some(owner_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    pub documents: Mutex<HashMap<Uuid, Document>>,
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.client_id == client_id)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        self.documents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("document"))
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        self.documents.lock().unwrap().insert(document.id, document);
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents.get_mut(&id).ok_or(StoreError::NotFound("document"))?;
        document.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTaskStore {
    pub tasks: Mutex<HashMap<Uuid, Task>>,
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.client_id == client_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        self.tasks
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("task"))
    }

    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.tasks.lock().unwrap().insert(task.id, task);
        Ok(())
    }

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        task.status = TaskStatus::Complete;
        task.completed_at = Some(completed_at);
        Ok(())
    }

    async fn assign(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        task.assigned_to = Some(user_id);
        Ok(())
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.status != TaskStatus::Complete
                    && t.due_date.map(|due| due < now).unwrap_or(false)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.due_date);
        Ok(tasks)
    }

    async fn find_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| {
                t.status != TaskStatus::Complete
                    && t.due_date.map(|due| due >= from && due <= to).unwrap_or(false)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.due_date);
        Ok(tasks)
    }
}

#[derive(Default)]
pub struct MemoryNoteStore {
    pub notes: Mutex<Vec<Note>>,
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Note>, StoreError> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, note: Note) -> Result<(), StoreError> {
        self.notes.lock().unwrap().push(note);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLoanScenarioStore {
    pub scenarios: Mutex<Vec<LoanScenario>>,
}

#[async_trait]
impl LoanScenarioStore for MemoryLoanScenarioStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<LoanScenario>, StoreError> {
        Ok(self
            .scenarios
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.client_id == client_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    pub users: Mutex<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, id: Uuid) -> Result<User, StoreError> {
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn first_active_with_role(&self, role: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        let mut matching: Vec<&User> = users
            .values()
            .filter(|u| u.role == role && u.is_active)
            .collect();
        matching.sort_by_key(|u| u.created_at);
        Ok(matching.first().map(|u| (*u).clone()))
    }
}

#[derive(Default)]
pub struct MemoryTemplateStore {
    pub templates: Mutex<HashMap<Uuid, MessageTemplate>>,
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get(&self, id: Uuid) -> Result<MessageTemplate, StoreError> {
        self.templates
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("message template"))
    }
}

#[derive(Default)]
pub struct MemoryCommunicationStore {
    pub communications: Mutex<Vec<Communication>>,
}

#[async_trait]
impl CommunicationStore for MemoryCommunicationStore {
    async fn insert(&self, communication: Communication) -> Result<(), StoreError> {
        self.communications.lock().unwrap().push(communication);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNotificationStore {
    pub notifications: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryActivityStore {
    pub entries: Mutex<Vec<ActivityEntry>>,
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWorkflowStore {
    pub workflows: Mutex<HashMap<Uuid, WorkflowDefinition>>,
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let mut matching: Vec<WorkflowDefinition> = self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.is_active && w.trigger_type == trigger_type)
            .cloned()
            .collect();
        matching.sort_by_key(|w| w.created_at);
        Ok(matching)
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("workflow"))
    }

    async fn list_all(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let mut all: Vec<WorkflowDefinition> =
            self.workflows.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }
}

#[derive(Default)]
pub struct MemoryExecutionStore {
    pub executions: Mutex<HashMap<Uuid, WorkflowExecution>>,
    pub logs: Mutex<Vec<WorkflowExecutionLog>>,
    pub continuations: Mutex<HashMap<Uuid, WaitContinuation>>,
    /// Every status write in order, so tests can assert the edge sequence.
    pub status_history: Mutex<Vec<(Uuid, ExecutionStatus)>>,
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn insert(&self, execution: WorkflowExecution) -> Result<(), StoreError> {
        self.executions.lock().unwrap().insert(execution.id, execution);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowExecution, StoreError> {
        self.executions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("execution"))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound("execution"))?;
        execution.status = status;
        if let Some(message) = error_message {
            execution.error_message = Some(message);
        }
        if status.is_terminal() {
            execution.completed_at = Some(Utc::now());
        }
        self.status_history.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn set_current_step(&self, id: Uuid, step_index: usize) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().unwrap();
        let execution = executions.get_mut(&id).ok_or(StoreError::NotFound("execution"))?;
        execution.current_step_index = step_index;
        Ok(())
    }

    async fn append_log(&self, log: WorkflowExecutionLog) -> Result<(), StoreError> {
        self.logs.lock().unwrap().push(log);
        Ok(())
    }

    async fn logs_for(&self, execution_id: Uuid) -> Result<Vec<WorkflowExecutionLog>, StoreError> {
        let mut logs: Vec<WorkflowExecutionLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.step_index);
        Ok(logs)
    }

    async fn save_continuation(&self, continuation: WaitContinuation) -> Result<(), StoreError> {
        self.continuations
            .lock()
            .unwrap()
            .insert(continuation.execution_id, continuation);
        Ok(())
    }

    async fn get_continuation(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WaitContinuation>, StoreError> {
        Ok(self.continuations.lock().unwrap().get(&execution_id).cloned())
    }

    async fn delete_continuation(&self, execution_id: Uuid) -> Result<(), StoreError> {
        self.continuations.lock().unwrap().remove(&execution_id);
        Ok(())
    }

    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitContinuation>, StoreError> {
        let mut due: Vec<WaitContinuation> = self
            .continuations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.resume_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.resume_at);
        Ok(due)
    }
}

/// Fresh empty store bundle for tests.
pub fn memory_stores() -> (Stores, MemoryHandles) {
    let clients = Arc::new(MemoryClientStore::default());
    let documents = Arc::new(MemoryDocumentStore::default());
    let tasks = Arc::new(MemoryTaskStore::default());
    let notes = Arc::new(MemoryNoteStore::default());
    let loan_scenarios = Arc::new(MemoryLoanScenarioStore::default());
    let users = Arc::new(MemoryUserStore::default());
    let templates = Arc::new(MemoryTemplateStore::default());
    let communications = Arc::new(MemoryCommunicationStore::default());
    let notifications = Arc::new(MemoryNotificationStore::default());
    let activity = Arc::new(MemoryActivityStore::default());
    let workflows = Arc::new(MemoryWorkflowStore::default());
    let executions = Arc::new(MemoryExecutionStore::default());

    let handles = MemoryHandles {
        clients: clients.clone(),
        documents: documents.clone(),
        tasks: tasks.clone(),
        notes: notes.clone(),
        loan_scenarios: loan_scenarios.clone(),
        users: users.clone(),
        templates: templates.clone(),
        communications: communications.clone(),
        notifications: notifications.clone(),
        activity: activity.clone(),
        workflows: workflows.clone(),
        executions: executions.clone(),
    };

    let stores = Stores {
        clients,
        documents,
        tasks,
        notes,
        loan_scenarios,
        users,
        templates,
        communications,
        notifications,
        activity,
        workflows,
        executions,
    };

    (stores, handles)
}

/// Concrete handles kept by tests to seed and inspect state directly.
#[derive(Clone)]
pub struct MemoryHandles {
    pub clients: Arc<MemoryClientStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub tasks: Arc<MemoryTaskStore>,
    pub notes: Arc<MemoryNoteStore>,
    pub loan_scenarios: Arc<MemoryLoanScenarioStore>,
    pub users: Arc<MemoryUserStore>,
    pub templates: Arc<MemoryTemplateStore>,
    pub communications: Arc<MemoryCommunicationStore>,
    pub notifications: Arc<MemoryNotificationStore>,
    pub activity: Arc<MemoryActivityStore>,
    pub workflows: Arc<MemoryWorkflowStore>,
    pub executions: Arc<MemoryExecutionStore>,
}
