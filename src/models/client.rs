use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client record with PII fields already decrypted by the store layer.
///
/// The engine never sees ciphertext; the Postgres store decrypts
/// `email`/`phone` on load and encrypts on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: ClientStatus,
    pub tags: Vec<String>,
    /// Advisor who owns the relationship.
    pub owner_id: Option<Uuid>,
    pub pipeline_stage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Lead,
    Active,
    UnderReview,
    Approved,
    Settled,
    Inactive,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "LEAD",
            Self::Active => "ACTIVE",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Settled => "SETTLED",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl std::str::FromStr for ClientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEAD" => Ok(Self::Lead),
            "ACTIVE" => Ok(Self::Active),
            "UNDER_REVIEW" => Ok(Self::UnderReview),
            "APPROVED" => Ok(Self::Approved),
            "SETTLED" => Ok(Self::Settled),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(format!("unknown client status: {}", other)),
        }
    }
}
