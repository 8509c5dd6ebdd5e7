// Workflow actions - the typed step list a definition executes, plus the
// outcome record each step produces.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::conditions::Condition;

/// One step in a workflow's action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub spec: ActionSpec,
    /// When true a failed step is logged and the run proceeds regardless of
    /// the workflow's failure policy.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl ActionStep {
    pub fn new(name: &str, spec: ActionSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            spec,
            continue_on_error: false,
        }
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Closed set of action types the executor understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    // Messaging
    SendEmail(SendMessageConfig),
    SendSms(SendMessageConfig),
    GenerateLetter(SendMessageConfig),

    // Tasks
    CreateTask(CreateTaskConfig),
    CompleteTask {
        /// Defaults to the triggering task when absent.
        #[serde(default)]
        task_id: Option<Uuid>,
    },
    AssignTask {
        #[serde(default)]
        task_id: Option<Uuid>,
        user_id: Uuid,
    },

    // Client record
    UpdateClientStatus {
        status: String,
    },
    AddTag(TagConfig),
    RemoveTag(TagConfig),
    AssignClient {
        user_id: Uuid,
    },

    // Documents
    UpdateDocumentStatus {
        /// Defaults to the triggering document when absent.
        #[serde(default)]
        document_id: Option<Uuid>,
        status: String,
    },
    RequestDocument {
        category: String,
        name: String,
        #[serde(default)]
        due_days: Option<i64>,
    },

    // Records
    CreateNote {
        body: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    SendNotification {
        /// Defaults to the client's owner when absent.
        #[serde(default)]
        user_id: Option<Uuid>,
        title: String,
        message: String,
        #[serde(default = "default_notification_kind")]
        kind: String,
    },
    LogActivity {
        action: String,
        detail: String,
    },

    // Flow control
    Wait(WaitConfig),
    Branch(Box<BranchConfig>),
    Parallel(ParallelConfig),

    // Integration
    CallWebhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// When true a non-2xx response or transport error fails the step.
        #[serde(default)]
        fail_on_error: bool,
    },
}

fn default_notification_kind() -> String {
    "WORKFLOW".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageConfig {
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Overrides the client's own address when present.
    #[serde(default)]
    pub recipient_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    /// Fallback when no explicit assignee: first active user with this role.
    #[serde(default)]
    pub assignee_role: Option<String>,
    #[serde(default)]
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    /// Relative due date, ignored when `due_date` is present.
    #[serde(default)]
    pub due_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
}

impl WaitConfig {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::days(self.days) + chrono::Duration::hours(self.hours)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub condition: Condition,
    #[serde(default)]
    pub then_actions: Vec<ActionStep>,
    #[serde(default)]
    pub else_actions: Vec<ActionStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub actions: Vec<ActionStep>,
    #[serde(default)]
    pub policy: ParallelPolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParallelPolicy {
    /// The group succeeds only when every child succeeds.
    #[default]
    AllSucceed,
    /// The group succeeds when at least one child succeeds.
    AnySucceeds,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("step '{step}': {message}")]
    Invalid { step: String, message: String },
}

impl ActionSpec {
    /// Wire name of the action type, logged with every execution entry.
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::SendEmail(_) => "SEND_EMAIL",
            Self::SendSms(_) => "SEND_SMS",
            Self::GenerateLetter(_) => "GENERATE_LETTER",
            Self::CreateTask(_) => "CREATE_TASK",
            Self::CompleteTask { .. } => "COMPLETE_TASK",
            Self::AssignTask { .. } => "ASSIGN_TASK",
            Self::UpdateClientStatus { .. } => "UPDATE_CLIENT_STATUS",
            Self::AddTag(_) => "ADD_TAG",
            Self::RemoveTag(_) => "REMOVE_TAG",
            Self::AssignClient { .. } => "ASSIGN_CLIENT",
            Self::UpdateDocumentStatus { .. } => "UPDATE_DOCUMENT_STATUS",
            Self::RequestDocument { .. } => "REQUEST_DOCUMENT",
            Self::CreateNote { .. } => "CREATE_NOTE",
            Self::SendNotification { .. } => "SEND_NOTIFICATION",
            Self::LogActivity { .. } => "LOG_ACTIVITY",
            Self::Wait(_) => "WAIT",
            Self::Branch(_) => "BRANCH",
            Self::Parallel(_) => "PARALLEL",
            Self::CallWebhook { .. } => "CALL_WEBHOOK",
        }
    }
}

impl ActionStep {
    /// Structural validation, run before any step executes. Catches
    /// configurations the executor cannot honor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |message: &str| ValidationError::Invalid {
            step: self.name.clone(),
            message: message.to_string(),
        };

        match &self.spec {
            ActionSpec::SendEmail(cfg) | ActionSpec::SendSms(cfg) | ActionSpec::GenerateLetter(cfg) => {
                if cfg.template_id.is_none() && cfg.body.is_none() {
                    return Err(invalid("requires a template_id or an inline body"));
                }
            }
            ActionSpec::CreateTask(cfg) => {
                if cfg.title.trim().is_empty() {
                    return Err(invalid("task title must not be empty"));
                }
            }
            ActionSpec::UpdateClientStatus { status } => {
                if status.parse::<crate::models::ClientStatus>().is_err() {
                    return Err(invalid("unknown client status"));
                }
            }
            ActionSpec::UpdateDocumentStatus { status, .. } => {
                if status.parse::<crate::models::DocumentStatus>().is_err() {
                    return Err(invalid("unknown document status"));
                }
            }
            ActionSpec::RequestDocument { category, name, .. } => {
                if category.trim().is_empty() || name.trim().is_empty() {
                    return Err(invalid("document category and name must not be empty"));
                }
            }
            ActionSpec::AddTag(cfg) | ActionSpec::RemoveTag(cfg) => {
                if cfg.tag.trim().is_empty() {
                    return Err(invalid("tag must not be empty"));
                }
            }
            ActionSpec::Wait(cfg) => {
                if cfg.days < 0 || cfg.hours < 0 {
                    return Err(invalid("wait duration must not be negative"));
                }
                if cfg.days == 0 && cfg.hours == 0 {
                    return Err(invalid("wait duration must be positive"));
                }
            }
            ActionSpec::Branch(cfg) => {
                for step in cfg.then_actions.iter().chain(cfg.else_actions.iter()) {
                    step.validate()?;
                }
            }
            ActionSpec::Parallel(cfg) => {
                if cfg.actions.is_empty() {
                    return Err(invalid("parallel group must not be empty"));
                }
                for step in &cfg.actions {
                    // Children run to completion inside one step slot, so
                    // suspension and further nesting are not honored there.
                    match step.spec {
                        ActionSpec::Wait(_) | ActionSpec::Branch(_) | ActionSpec::Parallel(_) => {
                            return Err(ValidationError::Invalid {
                                step: step.name.clone(),
                                message: "flow-control actions are not allowed inside a parallel group"
                                    .to_string(),
                            });
                        }
                        _ => step.validate()?,
                    }
                }
            }
            ActionSpec::CallWebhook { url, .. } => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(invalid("webhook url must be http(s)"));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// What one executed step reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    /// Records created or mutated by this step.
    #[serde(default)]
    pub side_effect_ids: Vec<Uuid>,
    /// Per-child outcomes when the step was a parallel group.
    #[serde(default)]
    pub children: Vec<(String, ActionOutcome)>,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            side_effect_ids: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            side_effect_ids: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_side_effect(mut self, id: Uuid) -> Self {
        self.side_effect_ids.push(id);
        self
    }
}
