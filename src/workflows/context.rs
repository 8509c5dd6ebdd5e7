// Evaluation context - the read snapshot a single execution runs against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::engine::EngineError;
use super::triggers::{TriggerPayload, TriggerType};
use crate::models::{Client, Document, LoanScenario, Note, Task};
use crate::store::Stores;

/// Snapshot of the subject client and its related records, built once per
/// execution and never mutated afterwards. Serialized into the execution row
/// so a WAIT/resume cycle continues against the exact state it started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub client: Client,
    pub documents: Vec<Document>,
    pub tasks: Vec<Task>,
    pub notes: Vec<Note>,
    pub loan_scenarios: Vec<LoanScenario>,
    pub trigger_type: TriggerType,
    pub payload: TriggerPayload,
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    /// Fetch a fresh snapshot for the entity named in the payload.
    ///
    /// For client-scoped triggers the payload entity is the client itself;
    /// task/document/note triggers carry the owning client separately.
    pub async fn build(
        stores: &Stores,
        trigger_type: TriggerType,
        payload: TriggerPayload,
    ) -> Result<Self, EngineError> {
        let client_id = payload.client_id.unwrap_or(payload.entity_id);

        let client = stores.clients.get(client_id).await?;
        let documents = stores.documents.for_client(client_id).await?;
        let tasks = stores.tasks.for_client(client_id).await?;
        let notes = stores.notes.for_client(client_id).await?;
        let loan_scenarios = stores.loan_scenarios.for_client(client_id).await?;

        Ok(Self {
            client,
            documents,
            tasks,
            notes,
            loan_scenarios,
            trigger_type,
            payload,
            now: Utc::now(),
        })
    }

    /// The task the firing event was about, when the trigger is task-scoped.
    pub fn subject_task_id(&self) -> Option<uuid::Uuid> {
        if self.trigger_type.is_task_scoped() {
            Some(self.payload.entity_id)
        } else {
            None
        }
    }

    /// The document the firing event was about, when the trigger is
    /// document-scoped.
    pub fn subject_document_id(&self) -> Option<uuid::Uuid> {
        if self.trigger_type.is_document_scoped() {
            Some(self.payload.entity_id)
        } else {
            None
        }
    }
}
