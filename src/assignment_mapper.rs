use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Transaction;
use uuid::Uuid;

use crate::html::extractor::RawShift;
use crate::models::{Assignment, AssignmentSource, Person};
use crate::repository::Repository;
use crate::validation::{Code, ValidationResult};

/// Resolves every distinct person reference (an email or Amion alias
/// string) appearing in a batch of scraped rows to a persisted [`Person`]
/// in one call. Kept behind a trait so the mapper can be tested against a
/// fixed roster without a database, and so a future directory-backed
/// resolver can replace the SQLite-backed one without touching the mapper
/// itself. Batched rather than per-candidate so resolution stays a fixed
/// number of round trips regardless of how many rows or distinct people a
/// scrape turns up.
#[async_trait]
pub trait PersonResolver: Send + Sync {
    async fn resolve_many(&self, candidates: &[String]) -> anyhow::Result<HashMap<String, Person>>;
}

/// Resolves against the `persons` table in one `SELECT`: exact email match
/// first, then alias membership, both case-insensitively — see
/// [`Person::matches`].
pub struct RepositoryPersonResolver<'a> {
    pub repo: &'a dyn Repository,
}

#[async_trait]
impl<'a> PersonResolver for RepositoryPersonResolver<'a> {
    async fn resolve_many(&self, candidates: &[String]) -> anyhow::Result<HashMap<String, Person>> {
        self.repo.find_persons_by_candidates(candidates)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn row_field(row: &RawShift) -> String {
    format!("{}|{}", row.date, row.shift_type)
}

/// Collects every distinct person reference appearing across `rows` and
/// resolves all of them in a single call to the resolver, so the
/// (synchronous, transaction-scoped) matching pass below never needs to
/// hold an `.await` point open inside a `rusqlite` transaction, and so
/// resolution itself is one round trip no matter how many rows or distinct
/// people the batch contains.
pub async fn resolve_people(
    resolver: &dyn PersonResolver,
    rows: &[RawShift],
) -> anyhow::Result<HashMap<String, Person>> {
    let mut seen = std::collections::HashSet::new();
    let mut distinct = Vec::new();
    for row in rows {
        let Some(candidate) = row.location.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        if seen.insert(candidate.to_string()) {
            distinct.push(candidate.to_string());
        }
    }
    resolver.resolve_many(&distinct).await
}

/// Maps scraped rows onto the materialized `ShiftInstance`s of
/// `schedule_version_id`, using the person lookups already resolved by
/// [`resolve_people`]. Returns the assignments that resolved cleanly plus
/// a `ValidationResult` carrying one error per row that didn't — person
/// resolution failure, missing assignee reference, unmatched shift
/// instance, inactive person, and specialty-constraint mismatch are all
/// row-level errors, never a propagated `Result::Err`; only a repository
/// I/O failure aborts the phase.
///
/// `location` doubles as the assigned person's identifier in the scraped
/// row — the Amion export has no separate "assignee" column, so this is
/// the one place row semantics outrun the strictly positional column
/// contract of the HTML extractor.
pub fn map_assignments(
    tx: &Transaction<'_>,
    repo: &dyn Repository,
    resolved: &HashMap<String, Person>,
    schedule_version_id: Uuid,
    rows: &[RawShift],
    created_by: Uuid,
) -> anyhow::Result<(Vec<Assignment>, ValidationResult)> {
    let mut assignments = Vec::new();
    let mut errors = ValidationResult::new();

    // One round trip for the whole version's shift instances, keyed by
    // (date, shift_type), instead of a `find_shift_instance` query per row.
    let instances_by_key: HashMap<(NaiveDate, String), crate::models::ShiftInstance> = repo
        .list_shift_instances_by_version(tx, schedule_version_id)?
        .into_iter()
        .map(|inst| ((inst.schedule_date, inst.shift_type.clone()), inst))
        .collect();

    for row in rows {
        let field = row_field(row);

        let Some(schedule_date) = parse_date(&row.date) else {
            errors.add_error_coded(&field, format!("{field}: unparseable date"), Code::InvalidValue);
            continue;
        };

        let Some(candidate) = row.location.as_deref().filter(|s| !s.is_empty()) else {
            errors.add_error_coded(&field, format!("{field}: no assigned person reference"), Code::MissingCell);
            continue;
        };

        let person = match resolved.get(candidate) {
            Some(p) if p.active => p.clone(),
            Some(_) => {
                errors.add_error_coded(&field, format!("{field}: person '{candidate}' is inactive"), Code::InvalidValue);
                continue;
            }
            None => {
                errors.add_error_coded(&field, format!("{field}: no person matches '{candidate}'"), Code::InvalidValue);
                continue;
            }
        };

        let shift_instance = instances_by_key.get(&(schedule_date, row.shift_type.clone())).cloned();
        let Some(shift_instance) = shift_instance else {
            errors.add_error_coded(
                &field,
                format!("{field}: no materialized shift instance for this date/type"),
                Code::MissingRow,
            );
            continue;
        };

        if let Some(constraint) = &shift_instance.specialty_constraint {
            let satisfies = match person.specialty {
                crate::models::Specialty::Both => true,
                crate::models::Specialty::BodyOnly => constraint.eq_ignore_ascii_case("body"),
                crate::models::Specialty::NeuroOnly => constraint.eq_ignore_ascii_case("neuro"),
            };
            if !satisfies {
                errors.add_error_coded(
                    &field,
                    format!("{field}: person's specialty does not satisfy constraint '{constraint}'"),
                    Code::InvalidValue,
                );
                continue;
            }
        }

        assignments.push(Assignment::new(
            person.id,
            shift_instance.id,
            schedule_date,
            row.shift_type.clone(),
            AssignmentSource::Amion,
            created_by,
        ));
    }

    Ok((assignments, errors))
}
