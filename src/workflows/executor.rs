// Action executor - dispatches one action step against the stores. Every
// mutating handler has a dry-run branch that reports intent without writing.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::actions::{
    ActionOutcome, ActionSpec, ActionStep, CreateTaskConfig, ParallelPolicy, SendMessageConfig,
};
use super::conditions;
use super::context::EvaluationContext;
use crate::models::{
    ActivityEntry, Communication, CommunicationStatus, Document, DocumentStatus, MessageChannel,
    Note, Notification, Task, TaskStatus,
};
use crate::services::email::Mailer;
use crate::store::{StoreError, Stores};

/// Whether a run is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    DryRun,
}

/// What executing one step means for the rest of the run.
#[derive(Debug)]
pub enum StepEffect {
    /// Step finished; the run moves to the next step.
    Done(ActionOutcome),
    /// Step suspended the run until `resume_at`.
    Suspend {
        outcome: ActionOutcome,
        resume_at: DateTime<Utc>,
    },
    /// Step expanded into further steps to run in its place.
    Splice {
        outcome: ActionOutcome,
        actions: Vec<ActionStep>,
    },
}

pub struct ActionExecutor {
    stores: Stores,
    mailer: Arc<dyn Mailer>,
    http: reqwest::Client,
}

impl ActionExecutor {
    pub fn new(stores: Stores, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            stores,
            mailer,
            http: reqwest::Client::new(),
        }
    }

    /// Execute one step. Handler errors surface as failed outcomes rather
    /// than bubbling out; the engine decides what a failure means.
    ///
    /// `owner` is the workflow's owning user, the last fallback for task
    /// assignment.
    pub async fn execute_step(
        &self,
        step: &ActionStep,
        ctx: &EvaluationContext,
        owner: Option<Uuid>,
        mode: ExecutionMode,
    ) -> StepEffect {
        debug!(
            step = %step.name,
            action = step.spec.action_type(),
            "Executing action step"
        );

        let result = match &step.spec {
            ActionSpec::SendEmail(cfg) => self.send_email(cfg, ctx, mode).await,
            ActionSpec::SendSms(cfg) => self.send_sms(cfg, ctx, mode).await,
            ActionSpec::GenerateLetter(cfg) => self.generate_letter(cfg, ctx, mode).await,
            ActionSpec::CreateTask(cfg) => self.create_task(cfg, ctx, owner, mode).await,
            ActionSpec::CompleteTask { task_id } => self.complete_task(*task_id, ctx, mode).await,
            ActionSpec::AssignTask { task_id, user_id } => {
                self.assign_task(*task_id, *user_id, ctx, mode).await
            }
            ActionSpec::UpdateClientStatus { status } => {
                self.update_client_status(status, ctx, mode).await
            }
            ActionSpec::AddTag(cfg) => self.add_tag(&cfg.tag, ctx, mode).await,
            ActionSpec::RemoveTag(cfg) => self.remove_tag(&cfg.tag, ctx, mode).await,
            ActionSpec::AssignClient { user_id } => self.assign_client(*user_id, ctx, mode).await,
            ActionSpec::UpdateDocumentStatus {
                document_id,
                status,
            } => {
                self.update_document_status(*document_id, status, ctx, mode)
                    .await
            }
            ActionSpec::RequestDocument {
                category,
                name,
                due_days,
            } => {
                self.request_document(category, name, *due_days, ctx, mode)
                    .await
            }
            ActionSpec::CreateNote { body, tags } => self.create_note(body, tags, ctx, mode).await,
            ActionSpec::SendNotification {
                user_id,
                title,
                message,
                kind,
            } => {
                self.send_notification(*user_id, title, message, kind, ctx, mode)
                    .await
            }
            ActionSpec::LogActivity { action, detail } => {
                self.log_activity(action, detail, ctx, mode).await
            }
            ActionSpec::Wait(cfg) => {
                let resume_at = Utc::now() + cfg.duration();
                let outcome = ActionOutcome::success(format!(
                    "waiting until {}",
                    resume_at.format("%Y-%m-%d %H:%M")
                ));
                if mode == ExecutionMode::DryRun {
                    // Dry runs note the pause and keep going.
                    return StepEffect::Done(ActionOutcome::success(format!(
                        "would wait {} days {} hours",
                        cfg.days, cfg.hours
                    )));
                }
                return StepEffect::Suspend { outcome, resume_at };
            }
            ActionSpec::Branch(cfg) => {
                let evaluation = conditions::evaluate(&cfg.condition, ctx);
                let (label, actions) = if evaluation.matched {
                    ("then", cfg.then_actions.clone())
                } else {
                    ("else", cfg.else_actions.clone())
                };
                let outcome = ActionOutcome::success(format!(
                    "branch took {} path ({} steps): {}",
                    label,
                    actions.len(),
                    evaluation.detail
                ));
                return StepEffect::Splice { outcome, actions };
            }
            ActionSpec::Parallel(cfg) => {
                return StepEffect::Done(self.run_parallel(cfg, ctx, owner, mode).await);
            }
            ActionSpec::CallWebhook {
                url,
                headers,
                fail_on_error,
            } => {
                self.call_webhook(url, headers, *fail_on_error, ctx, mode)
                    .await
            }
        };

        StepEffect::Done(result.unwrap_or_else(|e| ActionOutcome::failure(e.to_string())))
    }

    async fn run_parallel(
        &self,
        cfg: &super::actions::ParallelConfig,
        ctx: &EvaluationContext,
        owner: Option<Uuid>,
        mode: ExecutionMode,
    ) -> ActionOutcome {
        let futures = cfg
            .actions
            .iter()
            .map(|child| self.execute_step(child, ctx, owner, mode));
        let effects = futures::future::join_all(futures).await;

        let mut children = Vec::with_capacity(cfg.actions.len());
        let mut side_effect_ids = Vec::new();
        for (child, effect) in cfg.actions.iter().zip(effects) {
            // Validation bans suspension and nesting in parallel groups.
            let outcome = match effect {
                StepEffect::Done(outcome) => outcome,
                StepEffect::Suspend { outcome, .. } | StepEffect::Splice { outcome, .. } => outcome,
            };
            side_effect_ids.extend(outcome.side_effect_ids.iter().copied());
            children.push((child.name.clone(), outcome));
        }

        let succeeded = children.iter().filter(|(_, o)| o.success).count();
        let success = match cfg.policy {
            ParallelPolicy::AllSucceed => succeeded == children.len(),
            ParallelPolicy::AnySucceeds => succeeded > 0,
        };

        ActionOutcome {
            success,
            message: format!("{}/{} parallel steps succeeded", succeeded, children.len()),
            side_effect_ids,
            children,
        }
    }

    // Messaging ------------------------------------------------------------

    async fn resolve_message(
        &self,
        cfg: &SendMessageConfig,
        ctx: &EvaluationContext,
    ) -> Result<(Option<String>, String), StoreError> {
        let (subject, body) = match cfg.template_id {
            Some(template_id) => {
                let template = self.stores.templates.get(template_id).await?;
                (
                    cfg.subject.clone().or(template.subject),
                    cfg.body.clone().unwrap_or(template.body),
                )
            }
            None => (
                cfg.subject.clone(),
                cfg.body.clone().unwrap_or_default(),
            ),
        };
        Ok((
            subject.map(|s| render_placeholders(&s, ctx)),
            render_placeholders(&body, ctx),
        ))
    }

    async fn send_email(
        &self,
        cfg: &SendMessageConfig,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let recipient = cfg
            .recipient_override
            .clone()
            .unwrap_or_else(|| ctx.client.email.clone());
        let (subject, body) = self.resolve_message(cfg, ctx).await?;
        let subject_line = subject.clone().unwrap_or_else(|| "(no subject)".to_string());

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!(
                "would email {} with subject '{}'",
                recipient, subject_line
            )));
        }

        let delivery = self.mailer.send(&recipient, &subject_line, &body).await;
        let status = if delivery.is_ok() {
            CommunicationStatus::Sent
        } else {
            CommunicationStatus::Failed
        };

        let record = Communication {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            channel: MessageChannel::Email,
            recipient: recipient.clone(),
            subject,
            body,
            status,
            created_at: Utc::now(),
        };
        let record_id = record.id;
        self.stores.communications.insert(record).await?;
        self.record_activity(ctx, "EMAIL_SENT", format!("Email to {}", recipient), Some(record_id))
            .await?;

        match delivery {
            Ok(()) => Ok(ActionOutcome::success(format!("email sent to {}", recipient))
                .with_side_effect(record_id)),
            Err(e) => {
                warn!(recipient = %recipient, "Email delivery failed: {}", e);
                Ok(ActionOutcome::failure(format!("email delivery failed: {}", e))
                    .with_side_effect(record_id))
            }
        }
    }

    async fn send_sms(
        &self,
        cfg: &SendMessageConfig,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let recipient = match cfg.recipient_override.clone().or_else(|| ctx.client.phone.clone()) {
            Some(number) => number,
            None => return Ok(ActionOutcome::failure("client has no phone number on file")),
        };
        let (_, body) = self.resolve_message(cfg, ctx).await?;

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would SMS {}", recipient)));
        }

        // Delivery is delegated to the downstream gateway; the record is the
        // engine's responsibility.
        let record = Communication {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            channel: MessageChannel::Sms,
            recipient: recipient.clone(),
            subject: None,
            body,
            status: CommunicationStatus::Sent,
            created_at: Utc::now(),
        };
        let record_id = record.id;
        self.stores.communications.insert(record).await?;
        self.record_activity(ctx, "SMS_SENT", format!("SMS to {}", recipient), Some(record_id))
            .await?;

        Ok(ActionOutcome::success(format!("sms queued for {}", recipient)).with_side_effect(record_id))
    }

    async fn generate_letter(
        &self,
        cfg: &SendMessageConfig,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let recipient = cfg
            .recipient_override
            .clone()
            .unwrap_or_else(|| ctx.client.full_name());
        let (subject, body) = self.resolve_message(cfg, ctx).await?;

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would generate letter for {}", recipient)));
        }

        let record = Communication {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            channel: MessageChannel::Letter,
            recipient: recipient.clone(),
            subject,
            body,
            status: CommunicationStatus::Sent,
            created_at: Utc::now(),
        };
        let record_id = record.id;
        self.stores.communications.insert(record).await?;
        self.record_activity(
            ctx,
            "LETTER_GENERATED",
            format!("Letter for {}", recipient),
            Some(record_id),
        )
        .await?;

        Ok(ActionOutcome::success(format!("letter generated for {}", recipient))
            .with_side_effect(record_id))
    }

    // Tasks ----------------------------------------------------------------

    async fn create_task(
        &self,
        cfg: &CreateTaskConfig,
        ctx: &EvaluationContext,
        owner: Option<Uuid>,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        // Assignee chain: explicit user, then role lookup, then the workflow
        // owner, then the client's owner.
        let assignee = match cfg.assigned_to {
            Some(user_id) => Some(user_id),
            None => match &cfg.assignee_role {
                Some(role) => self
                    .stores
                    .users
                    .first_active_with_role(role)
                    .await?
                    .map(|u| u.id),
                None => owner.or(ctx.client.owner_id),
            },
        };

        let due_date = cfg
            .due_date
            .or_else(|| cfg.due_days.map(|days| Utc::now() + Duration::days(days)));

        let title = render_placeholders(&cfg.title, ctx);

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would create task '{}'", title)));
        }

        let task = Task {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            title: title.clone(),
            description: cfg
                .description
                .as_deref()
                .map(|d| render_placeholders(d, ctx)),
            status: TaskStatus::Todo,
            due_date,
            assigned_to: assignee,
            created_by: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        let task_id = task.id;
        self.stores.tasks.insert(task).await?;
        self.record_activity(ctx, "TASK_CREATED", format!("Task '{}'", title), Some(task_id))
            .await?;

        Ok(ActionOutcome::success(format!("task '{}' created", title)).with_side_effect(task_id))
    }

    async fn complete_task(
        &self,
        task_id: Option<Uuid>,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let target = match task_id.or_else(|| ctx.subject_task_id()) {
            Some(id) => id,
            None => {
                return Ok(ActionOutcome::failure(
                    "no task to complete: none configured and trigger is not task-scoped",
                ))
            }
        };

        let task = self.stores.tasks.get(target).await?;
        if task.status == TaskStatus::Complete {
            return Ok(ActionOutcome::success(format!("task '{}' already complete", task.title)));
        }

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would complete task '{}'", task.title)));
        }

        self.stores.tasks.complete(target, Utc::now()).await?;
        self.record_activity(
            ctx,
            "TASK_COMPLETED",
            format!("Task '{}' completed", task.title),
            Some(target),
        )
        .await?;

        Ok(ActionOutcome::success(format!("task '{}' completed", task.title))
            .with_side_effect(target))
    }

    async fn assign_task(
        &self,
        task_id: Option<Uuid>,
        user_id: Uuid,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let target = match task_id.or_else(|| ctx.subject_task_id()) {
            Some(id) => id,
            None => {
                return Ok(ActionOutcome::failure(
                    "no task to assign: none configured and trigger is not task-scoped",
                ))
            }
        };

        let user = self.stores.users.get(user_id).await?;
        if !user.is_active {
            return Ok(ActionOutcome::failure(format!(
                "user {} is inactive",
                user.display_name
            )));
        }

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!(
                "would assign task to {}",
                user.display_name
            )));
        }

        self.stores.tasks.assign(target, user_id).await?;
        self.record_activity(
            ctx,
            "TASK_ASSIGNED",
            format!("Task assigned to {}", user.display_name),
            Some(target),
        )
        .await?;

        Ok(ActionOutcome::success(format!("task assigned to {}", user.display_name))
            .with_side_effect(target))
    }

    // Client record --------------------------------------------------------

    async fn update_client_status(
        &self,
        status: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let parsed = status
            .parse::<crate::models::ClientStatus>()
            .map_err(StoreError::Corrupt)?;

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!(
                "would set client status to {}",
                parsed.as_str()
            )));
        }

        self.stores.clients.update_status(ctx.client.id, parsed).await?;
        self.record_activity(
            ctx,
            "CLIENT_STATUS_UPDATED",
            format!("Status set to {}", parsed.as_str()),
            None,
        )
        .await?;

        Ok(ActionOutcome::success(format!("client status set to {}", parsed.as_str()))
            .with_side_effect(ctx.client.id))
    }

    async fn add_tag(
        &self,
        tag: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would add tag '{}'", tag)));
        }

        let added = self.stores.clients.add_tag(ctx.client.id, tag).await?;
        if added {
            self.record_activity(ctx, "TAG_ADDED", format!("Tag '{}' added", tag), None)
                .await?;
            Ok(ActionOutcome::success(format!("tag '{}' added", tag)).with_side_effect(ctx.client.id))
        } else {
            Ok(ActionOutcome::success(format!("tag '{}' already present", tag)))
        }
    }

    async fn remove_tag(
        &self,
        tag: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would remove tag '{}'", tag)));
        }

        let removed = self.stores.clients.remove_tag(ctx.client.id, tag).await?;
        if removed {
            self.record_activity(ctx, "TAG_REMOVED", format!("Tag '{}' removed", tag), None)
                .await?;
            Ok(ActionOutcome::success(format!("tag '{}' removed", tag))
                .with_side_effect(ctx.client.id))
        } else {
            Ok(ActionOutcome::success(format!("tag '{}' was not present", tag)))
        }
    }

    async fn assign_client(
        &self,
        user_id: Uuid,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let user = self.stores.users.get(user_id).await?;
        if !user.is_active {
            return Ok(ActionOutcome::failure(format!(
                "user {} is inactive",
                user.display_name
            )));
        }

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!(
                "would assign client to {}",
                user.display_name
            )));
        }

        self.stores.clients.assign_owner(ctx.client.id, user_id).await?;
        self.record_activity(
            ctx,
            "CLIENT_ASSIGNED",
            format!("Client assigned to {}", user.display_name),
            None,
        )
        .await?;

        Ok(ActionOutcome::success(format!("client assigned to {}", user.display_name))
            .with_side_effect(ctx.client.id))
    }

    // Documents ------------------------------------------------------------

    async fn update_document_status(
        &self,
        document_id: Option<Uuid>,
        status: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let target = match document_id.or_else(|| ctx.subject_document_id()) {
            Some(id) => id,
            None => {
                return Ok(ActionOutcome::failure(
                    "no document to update: none configured and trigger is not document-scoped",
                ))
            }
        };
        let parsed = status
            .parse::<DocumentStatus>()
            .map_err(StoreError::Corrupt)?;

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!(
                "would set document status to {}",
                parsed.as_str()
            )));
        }

        self.stores.documents.update_status(target, parsed).await?;
        self.record_activity(
            ctx,
            "DOCUMENT_STATUS_UPDATED",
            format!("Document status set to {}", parsed.as_str()),
            Some(target),
        )
        .await?;

        Ok(ActionOutcome::success(format!("document status set to {}", parsed.as_str()))
            .with_side_effect(target))
    }

    async fn request_document(
        &self,
        category: &str,
        name: &str,
        due_days: Option<i64>,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would request document '{}'", name)));
        }

        let document = Document {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            name: name.to_string(),
            category: category.to_string(),
            status: DocumentStatus::Requested,
            due_date: due_days.map(|days| Utc::now() + Duration::days(days)),
            uploaded_at: None,
            created_at: Utc::now(),
        };
        let document_id = document.id;
        self.stores.documents.insert(document).await?;
        self.record_activity(
            ctx,
            "DOCUMENT_REQUESTED",
            format!("Document '{}' requested", name),
            Some(document_id),
        )
        .await?;

        Ok(ActionOutcome::success(format!("document '{}' requested", name))
            .with_side_effect(document_id))
    }

    // Records --------------------------------------------------------------

    async fn create_note(
        &self,
        body: &str,
        tags: &[String],
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let rendered = render_placeholders(body, ctx);

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success("would create note"));
        }

        let note = Note {
            id: Uuid::new_v4(),
            client_id: ctx.client.id,
            body: rendered,
            tags: tags.to_vec(),
            created_by: None,
            created_at: Utc::now(),
        };
        let note_id = note.id;
        self.stores.notes.insert(note).await?;
        self.record_activity(ctx, "NOTE_CREATED", "Note added".to_string(), Some(note_id))
            .await?;

        Ok(ActionOutcome::success("note created").with_side_effect(note_id))
    }

    async fn send_notification(
        &self,
        user_id: Option<Uuid>,
        title: &str,
        message: &str,
        kind: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        let recipient = match user_id.or(ctx.client.owner_id) {
            Some(id) => id,
            None => {
                return Ok(ActionOutcome::failure(
                    "no notification recipient: none configured and client has no owner",
                ))
            }
        };

        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success("would send notification"));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: recipient,
            title: render_placeholders(title, ctx),
            message: render_placeholders(message, ctx),
            kind: kind.to_string(),
            created_at: Utc::now(),
        };
        let notification_id = notification.id;
        self.stores.notifications.insert(notification).await?;
        self.record_activity(
            ctx,
            "NOTIFICATION_SENT",
            "Notification sent".to_string(),
            Some(notification_id),
        )
        .await?;

        Ok(ActionOutcome::success("notification sent").with_side_effect(notification_id))
    }

    async fn log_activity(
        &self,
        action: &str,
        detail: &str,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would log activity '{}'", action)));
        }

        let entry = ActivityEntry::system(
            Some(ctx.client.id),
            action,
            render_placeholders(detail, ctx),
            None,
        );
        let entry_id = entry.id;
        self.stores.activity.record(entry).await?;

        Ok(ActionOutcome::success(format!("activity '{}' logged", action))
            .with_side_effect(entry_id))
    }

    // Integration ----------------------------------------------------------

    async fn call_webhook(
        &self,
        url: &str,
        headers: &std::collections::HashMap<String, String>,
        fail_on_error: bool,
        ctx: &EvaluationContext,
        mode: ExecutionMode,
    ) -> Result<ActionOutcome, StoreError> {
        if mode == ExecutionMode::DryRun {
            return Ok(ActionOutcome::success(format!("would POST to {}", url)));
        }

        let payload = serde_json::json!({
            "client_id": ctx.client.id,
            "trigger_type": ctx.trigger_type.as_str(),
            "timestamp": Utc::now(),
        });

        let mut request = self.http.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(ActionOutcome::success(format!(
                "webhook responded {}",
                response.status()
            ))),
            Ok(response) => {
                let message = format!("webhook responded {}", response.status());
                if fail_on_error {
                    Ok(ActionOutcome::failure(message))
                } else {
                    warn!(url = %url, "{}", message);
                    Ok(ActionOutcome::success(format!("{} (ignored)", message)))
                }
            }
            Err(e) => {
                let message = format!("webhook call failed: {}", e);
                if fail_on_error {
                    Ok(ActionOutcome::failure(message))
                } else {
                    warn!(url = %url, "{}", message);
                    Ok(ActionOutcome::success(format!("{} (ignored)", message)))
                }
            }
        }
    }

    async fn record_activity(
        &self,
        ctx: &EvaluationContext,
        action: &str,
        detail: String,
        reference_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.stores
            .activity
            .record(ActivityEntry::system(
                Some(ctx.client.id),
                action,
                detail,
                reference_id,
            ))
            .await
    }
}

/// Substitute `{{token}}` placeholders against the context. Unknown tokens
/// are left untouched so template typos stay visible in the output.
pub fn render_placeholders(input: &str, ctx: &EvaluationContext) -> String {
    let pattern = Regex::new(r"\{\{([^}]+)\}\}").unwrap();
    pattern
        .replace_all(input, |caps: &regex::Captures| {
            match caps[1].trim() {
                "client_name" => ctx.client.full_name(),
                "client_first_name" => ctx.client.first_name.clone(),
                "client_email" => ctx.client.email.clone(),
                "client_phone" => ctx.client.phone.clone().unwrap_or_default(),
                "client_status" => ctx.client.status.as_str().to_string(),
                "trigger_type" => ctx.trigger_type.as_str().to_string(),
                "date" => ctx.now.format("%Y-%m-%d").to_string(),
                "time" => ctx.now.format("%H:%M").to_string(),
                _ => caps[0].to_string(),
            }
        })
        .to_string()
}
