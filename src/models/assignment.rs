use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentSource {
    Amion,
    Manual,
    Override,
}

impl AssignmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentSource::Amion => "AMION",
            AssignmentSource::Manual => "MANUAL",
            AssignmentSource::Override => "OVERRIDE",
        }
    }
}

/// The linkage of a [`crate::models::Person`] to a
/// [`crate::models::ShiftInstance`] for a given date. `original_shift_type`
/// preserves the source label verbatim even when it differs from the
/// matched `ShiftInstance.shift_type` (e.g. Amion's own vocabulary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub person_id: Uuid,
    pub shift_instance_id: Uuid,
    pub schedule_date: NaiveDate,
    pub original_shift_type: String,
    pub source: AssignmentSource,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Assignment {
    pub fn new(
        person_id: Uuid,
        shift_instance_id: Uuid,
        schedule_date: NaiveDate,
        original_shift_type: impl Into<String>,
        source: AssignmentSource,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            person_id,
            shift_instance_id,
            schedule_date,
            original_shift_type: original_shift_type.into(),
            source,
            created_at: Utc::now(),
            created_by,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Soft-delete: marks `deleted_at`/`deleted_by`. Idempotent — deleting an
    /// already-deleted assignment just overwrites the marker.
    pub fn soft_delete(&mut self, by: Uuid) {
        self.deleted_at = Some(Utc::now());
        self.deleted_by = Some(by);
    }

    /// Restore: clears the soft-delete markers. This never retroactively
    /// changes a prior `CoverageCalculation` snapshot — it only affects
    /// assignments a future coverage run will see.
    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.deleted_by = None;
    }
}
