use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::ValidationResult;

/// A computed, snapshot-bound summary of active assignments per position.
/// Weakly references a [`crate::models::ScheduleVersion`] (no ownership).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageCalculation {
    pub id: Uuid,
    pub schedule_version_id: Uuid,
    pub hospital_id: Uuid,
    pub calculated_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub coverage_by_position: std::collections::BTreeMap<String, u64>,
    pub coverage_summary: std::collections::HashMap<String, serde_json::Value>,
    pub validation_errors: ValidationResult,
    pub query_count: u32,
}
