// Postgres-backed store implementations. Enums are stored as text and parsed
// through the model FromStr impls; structured columns (conditions, actions,
// snapshots) are jsonb.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
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
use crate::services::encryption::EncryptionService;
use crate::workflows::engine::{
    ExecutionStatus, WaitContinuation, WorkflowDefinition, WorkflowExecution, WorkflowExecutionLog,
};
use crate::workflows::triggers::TriggerType;

/// Build the full production store bundle over one pool.
pub fn postgres_stores(pool: PgPool, encryption: Arc<EncryptionService>) -> Stores {
    Stores {
        clients: Arc::new(PgClientStore {
            pool: pool.clone(),
            encryption,
        }),
        documents: Arc::new(PgDocumentStore { pool: pool.clone() }),
        tasks: Arc::new(PgTaskStore { pool: pool.clone() }),
        notes: Arc::new(PgNoteStore { pool: pool.clone() }),
        loan_scenarios: Arc::new(PgLoanScenarioStore { pool: pool.clone() }),
        users: Arc::new(PgUserStore { pool: pool.clone() }),
        templates: Arc::new(PgTemplateStore { pool: pool.clone() }),
        communications: Arc::new(PgCommunicationStore { pool: pool.clone() }),
        notifications: Arc::new(PgNotificationStore { pool: pool.clone() }),
        activity: Arc::new(PgActivityStore { pool: pool.clone() }),
        workflows: Arc::new(PgWorkflowStore { pool: pool.clone() }),
        executions: Arc::new(PgExecutionStore { pool }),
    }
}

pub struct PgClientStore {
    pool: PgPool,
    encryption: Arc<EncryptionService>,
}

impl PgClientStore {
    fn map_client(
        &self,
        row: (
            Uuid,
            String,
            String,
            String,
            Option<String>,
            String,
            Vec<String>,
            Option<Uuid>,
            Option<String>,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
        ),
    ) -> Result<Client, StoreError> {
        let email = self
            .encryption
            .decrypt(&row.3)
            .map_err(|e| StoreError::Corrupt(format!("client email: {}", e)))?;
        let phone = match row.4 {
            Some(cipher) => Some(
                self.encryption
                    .decrypt(&cipher)
                    .map_err(|e| StoreError::Corrupt(format!("client phone: {}", e)))?,
            ),
            None => None,
        };
        Ok(Client {
            id: row.0,
            first_name: row.1,
            last_name: row.2,
            email,
            phone,
            status: row.5.parse::<ClientStatus>().map_err(StoreError::Corrupt)?,
            tags: row.6,
            owner_id: row.7,
            pipeline_stage: row.8,
            created_at: row.9,
            updated_at: row.10,
        })
    }

    async fn require_exists(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1 FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("client"))?;
        Ok(())
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn get(&self, id: Uuid) -> Result<Client, StoreError> {
        let row = sqlx::query_as::<_, (
            Uuid, String, String, String, Option<String>, String,
            Vec<String>, Option<Uuid>, Option<String>, DateTime<Utc>, Option<DateTime<Utc>>,
        )>(
            r#"
            SELECT id, first_name, last_name, email, phone, status,
                   tags, owner_id, pipeline_stage, created_at, updated_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("client"))?;

        self.map_client(row)
    }

    async fn update_status(&self, id: Uuid, status: ClientStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE clients SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("client"));
        }
        Ok(())
    }

    async fn add_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        // Set semantics: only appends when the tag is absent.
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET tags = array_append(tags, $2), updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(tags))
            "#,
        )
        .bind(id)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Zero rows is either "tag already present" or "no such client".
        self.require_exists(id).await?;
        Ok(false)
    }

    async fn remove_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET tags = array_remove(tags, $2), updated_at = NOW()
            WHERE id = $1 AND $2 = ANY(tags)
            "#,
        )
        .bind(id)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.require_exists(id).await?;
        Ok(false)
    }

    async fn assign_owner(&self, id: Uuid, owner_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE clients SET owner_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("client"));
        }
        Ok(())
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
}

type DocumentRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn map_document(row: DocumentRow) -> Result<Document, StoreError> {
    Ok(Document {
        id: row.0,
        client_id: row.1,
        name: row.2,
        category: row.3,
        status: row.4.parse::<DocumentStatus>().map_err(StoreError::Corrupt)?,
        due_date: row.5,
        uploaded_at: row.6,
        created_at: row.7,
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, client_id, name, category, status, due_date, uploaded_at, created_at
            FROM documents
            WHERE client_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_document).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, client_id, name, category, status, due_date, uploaded_at, created_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("document"))?;
        map_document(row)
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, client_id, name, category, status, due_date, uploaded_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(document.id)
        .bind(document.client_id)
        .bind(&document.name)
        .bind(&document.category)
        .bind(document.status.as_str())
        .bind(document.due_date)
        .bind(document.uploaded_at)
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("document"));
        }
        Ok(())
    }
}

pub struct PgTaskStore {
    pool: PgPool,
}

type TaskRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    String,
    Option<DateTime<Utc>>,
    Option<Uuid>,
    Option<Uuid>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn map_task(row: TaskRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: row.0,
        client_id: row.1,
        title: row.2,
        description: row.3,
        status: row.4.parse::<TaskStatus>().map_err(StoreError::Corrupt)?,
        due_date: row.5,
        assigned_to: row.6,
        created_by: row.7,
        completed_at: row.8,
        created_at: row.9,
    })
}

const TASK_COLUMNS: &str =
    "id, client_id, title, description, status, due_date, assigned_to, created_by, completed_at, created_at";

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE client_id = $1 ORDER BY created_at ASC",
            TASK_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_task).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("task"))?;
        map_task(row)
    }

    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, client_id, title, description, status, due_date,
                               assigned_to, created_by, completed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.id)
        .bind(task.client_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.due_date)
        .bind(task.assigned_to)
        .bind(task.created_by)
        .bind(task.completed_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, completed_at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'COMPLETE', completed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    async fn assign(&self, id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tasks SET assigned_to = $2 WHERE id = $1")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {} FROM tasks
            WHERE status <> 'COMPLETE' AND due_date < $1
            ORDER BY due_date ASC
            "#,
            TASK_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_task).collect()
    }

    async fn find_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {} FROM tasks
            WHERE status <> 'COMPLETE'
              AND due_date >= $1 AND due_date <= $2
            ORDER BY due_date ASC
            "#,
            TASK_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_task).collect()
    }
}

pub struct PgNoteStore {
    pool: PgPool,
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<Note>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, Vec<String>, Option<Uuid>, DateTime<Utc>)>(
            r#"
            SELECT id, client_id, body, tags, created_by, created_at
            FROM notes
            WHERE client_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Note {
                id: row.0,
                client_id: row.1,
                body: row.2,
                tags: row.3,
                created_by: row.4,
                created_at: row.5,
            })
            .collect())
    }

    async fn insert(&self, note: Note) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, client_id, body, tags, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(note.id)
        .bind(note.client_id)
        .bind(&note.body)
        .bind(&note.tags)
        .bind(note.created_by)
        .bind(note.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgLoanScenarioStore {
    pool: PgPool,
}

#[async_trait]
impl LoanScenarioStore for PgLoanScenarioStore {
    async fn for_client(&self, client_id: Uuid) -> Result<Vec<LoanScenario>, StoreError> {
        let rows = sqlx::query_as::<_, (
            Uuid, Uuid, String, rust_decimal::Decimal, Option<String>, Option<String>, DateTime<Utc>,
        )>(
            r#"
            SELECT id, client_id, name, amount, product, lender, created_at
            FROM loan_scenarios
            WHERE client_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| LoanScenario {
                id: row.0,
                client_id: row.1,
                name: row.2,
                amount: row.3,
                product: row.4,
                lender: row.5,
                created_at: row.6,
            })
            .collect())
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

type UserRow = (Uuid, String, String, String, bool, DateTime<Utc>);

fn map_user(row: UserRow) -> User {
    User {
        id: row.0,
        email: row.1,
        display_name: row.2,
        role: row.3,
        is_active: row.4,
        created_at: row.5,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get(&self, id: Uuid) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, display_name, role, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))?;
        Ok(map_user(row))
    }

    async fn first_active_with_role(&self, role: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, display_name, role, is_active, created_at
            FROM users
            WHERE role = $1 AND is_active = true
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(map_user))
    }
}

pub struct PgTemplateStore {
    pool: PgPool,
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn get(&self, id: Uuid) -> Result<MessageTemplate, StoreError> {
        let row = sqlx::query_as::<_, (
            Uuid, String, String, Option<String>, String, Vec<String>, DateTime<Utc>,
        )>(
            r#"
            SELECT id, name, channel, subject, body, placeholders, created_at
            FROM message_templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("message template"))?;

        Ok(MessageTemplate {
            id: row.0,
            name: row.1,
            channel: row.2.parse().map_err(StoreError::Corrupt)?,
            subject: row.3,
            body: row.4,
            placeholders: row.5,
            created_at: row.6,
        })
    }
}

pub struct PgCommunicationStore {
    pool: PgPool,
}

#[async_trait]
impl CommunicationStore for PgCommunicationStore {
    async fn insert(&self, communication: Communication) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO communications (id, client_id, channel, recipient, subject, body, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(communication.id)
        .bind(communication.client_id)
        .bind(communication.channel.as_str())
        .bind(&communication.recipient)
        .bind(&communication.subject)
        .bind(&communication.body)
        .bind(communication.status.as_str())
        .bind(communication.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgNotificationStore {
    pool: PgPool,
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.kind)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgActivityStore {
    pool: PgPool,
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn record(&self, entry: ActivityEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (id, client_id, actor, action, detail, reference_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.client_id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.detail)
        .bind(entry.reference_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgWorkflowStore {
    pool: PgPool,
}

type WorkflowRow = (
    Uuid,
    String,
    Option<String>,
    String,
    Option<serde_json::Value>,
    serde_json::Value,
    bool,
    String,
    String,
    Option<Uuid>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const WORKFLOW_COLUMNS: &str = "id, name, description, trigger_type, condition, actions, \
     is_active, failure_policy, completion_mode, owner_id, created_at, updated_at";

fn map_workflow(row: WorkflowRow) -> Result<WorkflowDefinition, StoreError> {
    let trigger_type = row
        .3
        .parse::<TriggerType>()
        .map_err(StoreError::Corrupt)?;
    let condition = match row.4 {
        Some(value) => Some(
            serde_json::from_value(value)
                .map_err(|e| StoreError::Corrupt(format!("workflow condition: {}", e)))?,
        ),
        None => None,
    };
    let actions = serde_json::from_value(row.5)
        .map_err(|e| StoreError::Corrupt(format!("workflow actions: {}", e)))?;
    let failure_policy = serde_json::from_value(serde_json::Value::String(row.7))
        .map_err(|e| StoreError::Corrupt(format!("failure policy: {}", e)))?;
    let completion_mode = serde_json::from_value(serde_json::Value::String(row.8))
        .map_err(|e| StoreError::Corrupt(format!("completion mode: {}", e)))?;

    Ok(WorkflowDefinition {
        id: row.0,
        name: row.1,
        description: row.2,
        trigger_type,
        condition,
        actions,
        is_active: row.6,
        failure_policy,
        completion_mode,
        owner: row.9,
        created_at: row.10,
        updated_at: row.11,
    })
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            SELECT {} FROM workflows
            WHERE is_active = true AND trigger_type = $1
            ORDER BY created_at ASC
            "#,
            WORKFLOW_COLUMNS
        ))
        .bind(trigger_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_workflow).collect()
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowDefinition, StoreError> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE id = $1",
            WORKFLOW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("workflow"))?;
        map_workflow(row)
    }

    async fn list_all(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows ORDER BY created_at ASC",
            WORKFLOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(map_workflow).collect()
    }
}

pub struct PgExecutionStore {
    pool: PgPool,
}

type ExecutionRow = (
    Uuid,
    Uuid,
    serde_json::Value,
    String,
    i32,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
);

fn map_execution(row: ExecutionRow) -> Result<WorkflowExecution, StoreError> {
    Ok(WorkflowExecution {
        id: row.0,
        workflow_id: row.1,
        context_snapshot: row.2,
        status: row.3.parse::<ExecutionStatus>().map_err(StoreError::Corrupt)?,
        current_step_index: row.4 as usize,
        started_at: row.5,
        completed_at: row.6,
        error_message: row.7,
    })
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn insert(&self, execution: WorkflowExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, context_snapshot, status, current_step_index,
                 started_at, completed_at, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(&execution.context_snapshot)
        .bind(execution.status.as_str())
        .bind(execution.current_step_index as i32)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(&execution.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<WorkflowExecution, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, workflow_id, context_snapshot, status, current_step_index,
                   started_at, completed_at, error_message
            FROM workflow_executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("execution"))?;
        map_execution(row)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error_message: Option<String>,
    ) -> Result<(), StoreError> {
        let completed_at = status.is_terminal().then(Utc::now);
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, error_message = COALESCE($3, error_message),
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("execution"));
        }
        Ok(())
    }

    async fn set_current_step(&self, id: Uuid, step_index: usize) -> Result<(), StoreError> {
        sqlx::query("UPDATE workflow_executions SET current_step_index = $2 WHERE id = $1")
            .bind(id)
            .bind(step_index as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_log(&self, log: WorkflowExecutionLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_execution_logs
                (id, execution_id, step_index, action_type, success, message,
                 side_effect_ids, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.id)
        .bind(log.execution_id)
        .bind(log.step_index as i32)
        .bind(&log.action_type)
        .bind(log.success)
        .bind(&log.message)
        .bind(&log.side_effect_ids)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn logs_for(&self, execution_id: Uuid) -> Result<Vec<WorkflowExecutionLog>, StoreError> {
        let rows = sqlx::query_as::<_, (
            Uuid, Uuid, i32, String, bool, String, Vec<Uuid>, DateTime<Utc>,
        )>(
            r#"
            SELECT id, execution_id, step_index, action_type, success, message,
                   side_effect_ids, created_at
            FROM workflow_execution_logs
            WHERE execution_id = $1
            ORDER BY step_index ASC, created_at ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| WorkflowExecutionLog {
                id: row.0,
                execution_id: row.1,
                step_index: row.2 as usize,
                action_type: row.3,
                success: row.4,
                message: row.5,
                side_effect_ids: row.6,
                created_at: row.7,
            })
            .collect())
    }

    async fn save_continuation(&self, continuation: WaitContinuation) -> Result<(), StoreError> {
        let remaining = serde_json::to_value(&continuation.remaining)
            .map_err(|e| StoreError::Corrupt(format!("continuation steps: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO workflow_continuations (execution_id, resume_at, resume_at_step_index, remaining)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (execution_id)
            DO UPDATE SET resume_at = $2, resume_at_step_index = $3, remaining = $4
            "#,
        )
        .bind(continuation.execution_id)
        .bind(continuation.resume_at)
        .bind(continuation.resume_at_step_index as i32)
        .bind(remaining)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_continuation(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WaitContinuation>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, i32, serde_json::Value)>(
            r#"
            SELECT execution_id, resume_at, resume_at_step_index, remaining
            FROM workflow_continuations
            WHERE execution_id = $1
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let remaining = serde_json::from_value(row.3)
                .map_err(|e| StoreError::Corrupt(format!("continuation steps: {}", e)))?;
            Ok(WaitContinuation {
                execution_id: row.0,
                resume_at: row.1,
                resume_at_step_index: row.2 as usize,
                remaining,
            })
        })
        .transpose()
    }

    async fn delete_continuation(&self, execution_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM workflow_continuations WHERE execution_id = $1")
            .bind(execution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn due_continuations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitContinuation>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, DateTime<Utc>, i32, serde_json::Value)>(
            r#"
            SELECT execution_id, resume_at, resume_at_step_index, remaining
            FROM workflow_continuations
            WHERE resume_at <= $1
            ORDER BY resume_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let remaining = serde_json::from_value(row.3)
                    .map_err(|e| StoreError::Corrupt(format!("continuation steps: {}", e)))?;
                Ok(WaitContinuation {
                    execution_id: row.0,
                    resume_at: row.1,
                    resume_at_step_index: row.2 as usize,
                    remaining,
                })
            })
            .collect()
    }
}
