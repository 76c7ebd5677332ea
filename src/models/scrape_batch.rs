use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScrapeBatchState {
    Pending,
    Complete,
    Failed,
}

impl ScrapeBatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeBatchState::Pending => "PENDING",
            ScrapeBatchState::Complete => "COMPLETE",
            ScrapeBatchState::Failed => "FAILED",
        }
    }
}

/// The record of one Amion scraping operation. `scrape_batch_ref` on
/// [`crate::models::ScheduleVersion`] is a soft association onto this row —
/// deleting a batch must never cascade to the version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeBatch {
    pub id: Uuid,
    pub hospital_id: Uuid,
    pub state: ScrapeBatchState,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub row_count: i64,
    pub ingest_checksum: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl ScrapeBatch {
    pub fn new_pending(
        hospital_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        created_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            hospital_id,
            state: ScrapeBatchState::Pending,
            window_start,
            window_end,
            scraped_at: now,
            completed_at: None,
            row_count: 0,
            ingest_checksum: String::new(),
            error_message: None,
            created_at: now,
            created_by,
            deleted_at: None,
            archived_at: None,
        }
    }

    /// Legal only from PENDING.
    pub fn mark_complete(&mut self, row_count: i64, checksum: String) -> Result<(), PipelineError> {
        if self.state != ScrapeBatchState::Pending {
            return Err(PipelineError::InvalidStateTransition(format!(
                "cannot mark complete from {}",
                self.state.as_str()
            )));
        }
        self.state = ScrapeBatchState::Complete;
        self.row_count = row_count;
        self.ingest_checksum = checksum;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Legal only from PENDING.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), PipelineError> {
        if self.state != ScrapeBatchState::Pending {
            return Err(PipelineError::InvalidStateTransition(format!(
                "cannot mark failed from {}",
                self.state.as_str()
            )));
        }
        self.state = ScrapeBatchState::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Orthogonal to `state` — a COMPLETE or FAILED batch can still be archived.
    pub fn mark_archived(&mut self) {
        self.archived_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_to_pending_is_rejected() {
        let mut b = ScrapeBatch::new_pending(Uuid::new_v4(), Utc::now(), Utc::now(), Uuid::new_v4());
        b.mark_complete(10, "deadbeef".to_string()).unwrap();
        let err = b.mark_complete(20, "other".to_string()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStateTransition(_)));
        assert_eq!(b.row_count, 10, "first completion must stick");
    }

    #[test]
    fn archive_is_orthogonal_to_state() {
        let mut b = ScrapeBatch::new_pending(Uuid::new_v4(), Utc::now(), Utc::now(), Uuid::new_v4());
        b.mark_failed("amion returned 503").unwrap();
        assert!(b.archived_at.is_none());
        b.mark_archived();
        assert!(b.archived_at.is_some());
        assert_eq!(b.state, ScrapeBatchState::Failed);
    }
}
