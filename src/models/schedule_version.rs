use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionStatus {
    Staging,
    Production,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Staging => "STAGING",
            VersionStatus::Production => "PRODUCTION",
            VersionStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STAGING" => Some(VersionStatus::Staging),
            "PRODUCTION" => Some(VersionStatus::Production),
            "ARCHIVED" => Some(VersionStatus::Archived),
            _ => None,
        }
    }
}

/// An immutable snapshot of one hospital's shift definitions for a date
/// window. `status` is the only field that mutates after creation, and only
/// via the state-machine methods below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleVersion {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub status: VersionStatus,
    pub effective_start: DateTime<Utc>,
    pub effective_end: DateTime<Utc>,
    pub scrape_batch_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl ScheduleVersion {
    pub fn new_staging(
        hospital_id: Uuid,
        effective_start: DateTime<Utc>,
        effective_end: DateTime<Utc>,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hospital_id,
            status: VersionStatus::Staging,
            effective_start,
            effective_end,
            scrape_batch_ref: None,
            created_at: now,
            created_by,
            updated_at: now,
            updated_by: created_by,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Legal only from STAGING. Rejects any other starting status.
    pub fn promote(&mut self, user: Uuid) -> Result<(), crate::error::PipelineError> {
        if self.status != VersionStatus::Staging {
            return Err(crate::error::PipelineError::InvalidVersionStateTransition(
                format!("cannot promote version from {}", self.status.as_str()),
            ));
        }
        self.status = VersionStatus::Production;
        self.updated_at = Utc::now();
        self.updated_by = user;
        Ok(())
    }

    /// Legal only from PRODUCTION.
    pub fn archive(&mut self, user: Uuid) -> Result<(), crate::error::PipelineError> {
        if self.status != VersionStatus::Production {
            return Err(crate::error::PipelineError::InvalidVersionStateTransition(
                format!("cannot archive version from {}", self.status.as_str()),
            ));
        }
        self.status = VersionStatus::Archived;
        self.updated_at = Utc::now();
        self.updated_by = user;
        Ok(())
    }
}
