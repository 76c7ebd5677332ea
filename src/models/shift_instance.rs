use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One required shift within a [`crate::models::ScheduleVersion`].
/// Completely immutable after creation: no update, no delete fields, no
/// setter surface — a schedule revision creates a new version instead of
/// mutating an existing shift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftInstance {
    pub id: Uuid,
    pub schedule_version_id: Uuid,
    pub shift_type: String,
    pub schedule_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub hospital_id: Uuid,
    pub study_type: Option<String>,
    pub specialty_constraint: Option<String>,
    pub desired_coverage: i64,
    pub is_mandatory: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
}

impl ShiftInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule_version_id: Uuid,
        shift_type: impl Into<String>,
        schedule_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        hospital_id: Uuid,
        study_type: Option<String>,
        specialty_constraint: Option<String>,
        desired_coverage: i64,
        is_mandatory: bool,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_version_id,
            shift_type: shift_type.into(),
            schedule_date,
            start_time,
            end_time,
            hospital_id,
            study_type,
            specialty_constraint,
            desired_coverage,
            is_mandatory,
            created_at: Utc::now(),
            created_by,
        }
    }
}
