// Users, templates, and the records produced by workflow actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    /// Free-form role key, e.g. "advisor", "processor".
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageChannel {
    Email,
    Sms,
    Letter,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
            Self::Letter => "LETTER",
        }
    }
}

impl std::str::FromStr for MessageChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            "LETTER" => Ok(Self::Letter),
            other => Err(format!("unknown message channel: {}", other)),
        }
    }
}

/// A reusable message template with declared placeholder names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub id: Uuid,
    pub name: String,
    pub channel: MessageChannel,
    pub subject: Option<String>,
    pub body: String,
    pub placeholders: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub id: Uuid,
    pub client_id: Uuid,
    pub channel: MessageChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: CommunicationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommunicationStatus {
    Sent,
    Failed,
}

impl CommunicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for CommunicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown communication status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail entry. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    /// Entry attributed to the workflow engine itself.
    pub fn system(client_id: Option<Uuid>, action: &str, detail: String, reference_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            actor: "workflow-engine".to_string(),
            action: action.to_string(),
            detail,
            reference_id,
            created_at: Utc::now(),
        }
    }
}
