use chrono::{NaiveDate, NaiveTime};
use rusqlite::Transaction;
use uuid::Uuid;

use crate::models::ShiftInstance;
use crate::ods::cell::{Cell, OdsDocument};
use crate::repository::Repository;
use crate::validation::{Code, ValidationResult};

/// One row of the ODS sheet, addressed by its column position. The sheet
/// layout is fixed: date, shift type, start time, end time, study type
/// (optional), specialty constraint (optional), desired coverage, is
/// mandatory. Header rows are whatever the first row of the sheet is and
/// are always skipped.
const COL_DATE: usize = 0;
const COL_SHIFT_TYPE: usize = 1;
const COL_START_TIME: usize = 2;
const COL_END_TIME: usize = 3;
const COL_STUDY_TYPE: usize = 4;
const COL_SPECIALTY_CONSTRAINT: usize = 5;
const COL_DESIRED_COVERAGE: usize = 6;
const COL_IS_MANDATORY: usize = 7;

fn cell_at(cells: &[Cell], col: usize) -> Option<&Cell> {
    cells.iter().find(|c| c.col == col)
}

fn cell_text(cells: &[Cell], col: usize) -> Option<String> {
    cell_at(cells, col).map(|c| c.value.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "y")
}

/// Converts one parsed ODS sheet into `ShiftInstance` rows ready for
/// insertion, row by row. A row missing a required field, with an
/// unparseable date/time, or a non-positive `desired_coverage` is skipped
/// and recorded as a row-level error; a single bad row never blocks its
/// siblings.
pub fn build_shift_instances(
    document: &OdsDocument,
    schedule_version_id: Uuid,
    hospital_id: Uuid,
    created_by: Uuid,
) -> (Vec<ShiftInstance>, ValidationResult) {
    let mut instances = Vec::new();
    let mut errors = ValidationResult::new();

    for sheet in &document.sheets {
        for (row_index, row) in sheet.rows.iter().enumerate() {
            if row_index == 0 {
                continue;
            }
            let field = format!("{}!R{row_index}", sheet.name);
            let cells = &row.cells;

            let date_raw = cell_text(cells, COL_DATE);
            let shift_type = cell_text(cells, COL_SHIFT_TYPE);
            let start_raw = cell_text(cells, COL_START_TIME);
            let end_raw = cell_text(cells, COL_END_TIME);
            let coverage_raw = cell_text(cells, COL_DESIRED_COVERAGE);

            if date_raw.is_none()
                || shift_type.is_none()
                || start_raw.is_none()
                || end_raw.is_none()
                || coverage_raw.is_none()
            {
                errors.add_error_coded(&field, format!("{field} missing a required column"), Code::MissingCell);
                continue;
            }

            let date_raw = date_raw.unwrap();
            let Some(schedule_date) = parse_date(&date_raw) else {
                errors.add_error_coded(&field, format!("{field} has unparseable date '{date_raw}'"), Code::InvalidValue);
                continue;
            };

            let start_raw = start_raw.unwrap();
            let Some(start_time) = parse_time(&start_raw) else {
                errors.add_error_coded(&field, format!("{field} has unparseable start_time '{start_raw}'"), Code::InvalidValue);
                continue;
            };

            let end_raw = end_raw.unwrap();
            let Some(end_time) = parse_time(&end_raw) else {
                errors.add_error_coded(&field, format!("{field} has unparseable end_time '{end_raw}'"), Code::InvalidValue);
                continue;
            };

            let coverage_raw = coverage_raw.unwrap();
            let desired_coverage: i64 = match coverage_raw.parse() {
                Ok(n) if n > 0 => n,
                _ => {
                    errors.add_error_coded(
                        &field,
                        format!("{field} has non-positive desired_coverage '{coverage_raw}'"),
                        Code::InvalidValue,
                    );
                    continue;
                }
            };

            let study_type = cell_text(cells, COL_STUDY_TYPE);
            let specialty_constraint = cell_text(cells, COL_SPECIALTY_CONSTRAINT);
            let is_mandatory = cell_text(cells, COL_IS_MANDATORY).map(|s| parse_bool(&s)).unwrap_or(false);

            instances.push(ShiftInstance::new(
                schedule_version_id,
                shift_type.unwrap(),
                schedule_date,
                start_time,
                end_time,
                hospital_id,
                study_type,
                specialty_constraint,
                desired_coverage,
                is_mandatory,
                created_by,
            ));
        }
    }

    (instances, errors)
}

/// Persists `instances` under the caller's open transaction. Only a
/// `rusqlite` failure propagates; every other defect is already folded
/// into the `ValidationResult` returned by [`build_shift_instances`].
pub fn materialize(
    repo: &dyn Repository,
    tx: &Transaction,
    instances: &[ShiftInstance],
) -> anyhow::Result<()> {
    if instances.is_empty() {
        return Ok(());
    }
    repo.insert_shift_instances(tx, instances)
}
