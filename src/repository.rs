use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use uuid::Uuid;

use crate::models::{
    Assignment, AuditLog, CoverageCalculation, Person, ScheduleVersion, ScrapeBatch,
    ShiftInstance, Specialty, VersionStatus,
};
use crate::schema::SCHEMA;

fn specialty_str(s: Specialty) -> &'static str {
    match s {
        Specialty::BodyOnly => "BODY_ONLY",
        Specialty::NeuroOnly => "NEURO_ONLY",
        Specialty::Both => "BOTH",
    }
}

fn parse_specialty(s: &str) -> Specialty {
    match s {
        "BODY_ONLY" => Specialty::BodyOnly,
        "NEURO_ONLY" => Specialty::NeuroOnly,
        _ => Specialty::Both,
    }
}

/// The persistence boundary for batch insert, soft-delete, version-status
/// transitions, and per-version lookups. Every
/// mutating method takes the caller's open [`Transaction`] explicitly —
/// the repository never opens its own transaction mid-phase, since phase
/// boundaries (and therefore commit/rollback boundaries) belong to the
/// orchestrator, not to individual repository calls.
pub trait Repository: Send + Sync {
    fn run_in_transaction<F, R>(&self, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&Transaction) -> anyhow::Result<R>;

    fn insert_schedule_version(&self, tx: &Transaction, version: &ScheduleVersion) -> anyhow::Result<()>;
    fn update_schedule_version(&self, tx: &Transaction, version: &ScheduleVersion) -> anyhow::Result<()>;
    fn find_production_version(
        &self,
        tx: &Transaction,
        hospital_id: Uuid,
    ) -> anyhow::Result<Option<ScheduleVersion>>;
    fn find_schedule_version(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<ScheduleVersion>>;

    fn insert_shift_instances(&self, tx: &Transaction, shifts: &[ShiftInstance]) -> anyhow::Result<()>;
    fn find_shift_instance(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
        date: NaiveDate,
        shift_type: &str,
    ) -> anyhow::Result<Option<ShiftInstance>>;
    /// All `ShiftInstance`s owned by `schedule_version_id`, one round trip —
    /// the batch-lookup counterpart to `find_shift_instance`, for callers
    /// (the assignment mapper) that need to resolve many rows against the
    /// same version instead of querying once per row.
    fn list_shift_instances_by_version(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
    ) -> anyhow::Result<Vec<ShiftInstance>>;

    fn insert_scrape_batch(&self, tx: &Transaction, batch: &ScrapeBatch) -> anyhow::Result<()>;
    fn update_scrape_batch(&self, tx: &Transaction, batch: &ScrapeBatch) -> anyhow::Result<()>;
    fn soft_delete_scrape_batch(
        &self,
        tx: &Transaction,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    fn insert_assignments(&self, tx: &Transaction, assignments: &[Assignment]) -> anyhow::Result<()>;
    fn find_assignment(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<Assignment>>;
    fn update_assignment(&self, tx: &Transaction, assignment: &Assignment) -> anyhow::Result<()>;

    /// Create-once — there is no `update_person` beyond the soft-delete/
    /// restore markers; any other change means a new record.
    fn insert_person(&self, tx: &Transaction, person: &Person) -> anyhow::Result<()>;
    fn find_person(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<Person>>;
    fn update_person(&self, tx: &Transaction, person: &Person) -> anyhow::Result<()>;
    fn find_person_by_email_or_alias(&self, candidate: &str) -> anyhow::Result<Option<Person>>;
    /// Resolves every distinct `candidates` string to its matching active
    /// `Person` (by email or alias) in a single `SELECT`, rather than one
    /// query per candidate — the batch counterpart `assignment_mapper`
    /// uses instead of calling `find_person_by_email_or_alias` in a loop.
    fn find_persons_by_candidates(
        &self,
        candidates: &[String],
    ) -> anyhow::Result<std::collections::HashMap<String, Person>>;

    /// A single `SELECT ... JOIN ... GROUP BY` — one round trip, never
    /// per-position queries in a loop.
    fn coverage_by_position(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
    ) -> anyhow::Result<BTreeMap<String, u64>>;
    fn insert_coverage_calculation(
        &self,
        tx: &Transaction,
        calc: &CoverageCalculation,
    ) -> anyhow::Result<()>;

    fn insert_audit_log(&self, tx: &Transaction, log: &AuditLog) -> anyhow::Result<()>;
}

/// `rusqlite`-backed implementation built around a single
/// `Mutex<Connection>`, serializing access across the richer entity set
/// this pipeline persists.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Repository for SqliteRepository {
    /// Opens a `BEGIN IMMEDIATE` transaction (the embedded-engine stand-in
    /// for Read Committed isolation — see DESIGN.md), runs `f`, and commits
    /// on `Ok` or lets the transaction drop-rollback on `Err`.
    fn run_in_transaction<F, R>(&self, f: F) -> anyhow::Result<R>
    where
        F: FnOnce(&Transaction) -> anyhow::Result<R>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn insert_schedule_version(&self, tx: &Transaction, version: &ScheduleVersion) -> anyhow::Result<()> {
        tx.execute(
            "INSERT INTO schedule_versions
             (id, hospital_id, status, effective_start, effective_end, scrape_batch_ref,
              created_at, created_by, updated_at, updated_by, deleted_at, deleted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                version.id,
                version.hospital_id,
                version.status.as_str(),
                version.effective_start,
                version.effective_end,
                version.scrape_batch_ref,
                version.created_at,
                version.created_by,
                version.updated_at,
                version.updated_by,
                version.deleted_at,
                version.deleted_by,
            ],
        )?;
        Ok(())
    }

    fn update_schedule_version(&self, tx: &Transaction, version: &ScheduleVersion) -> anyhow::Result<()> {
        tx.execute(
            "UPDATE schedule_versions
             SET status = ?2, updated_at = ?3, updated_by = ?4,
                 deleted_at = ?5, deleted_by = ?6, scrape_batch_ref = ?7
             WHERE id = ?1",
            params![
                version.id,
                version.status.as_str(),
                version.updated_at,
                version.updated_by,
                version.deleted_at,
                version.deleted_by,
                version.scrape_batch_ref,
            ],
        )?;
        Ok(())
    }

    fn find_production_version(
        &self,
        tx: &Transaction,
        hospital_id: Uuid,
    ) -> anyhow::Result<Option<ScheduleVersion>> {
        tx.query_row(
            "SELECT id, hospital_id, status, effective_start, effective_end, scrape_batch_ref,
                    created_at, created_by, updated_at, updated_by, deleted_at, deleted_by
             FROM schedule_versions
             WHERE hospital_id = ?1 AND status = 'PRODUCTION' AND deleted_at IS NULL",
            params![hospital_id],
            row_to_schedule_version,
        )
        .optional()
        .map_err(Into::into)
    }

    fn find_schedule_version(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<ScheduleVersion>> {
        tx.query_row(
            "SELECT id, hospital_id, status, effective_start, effective_end, scrape_batch_ref,
                    created_at, created_by, updated_at, updated_by, deleted_at, deleted_by
             FROM schedule_versions WHERE id = ?1",
            params![id],
            row_to_schedule_version,
        )
        .optional()
        .map_err(Into::into)
    }

    fn insert_shift_instances(&self, tx: &Transaction, shifts: &[ShiftInstance]) -> anyhow::Result<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO shift_instances
             (id, schedule_version_id, shift_type, schedule_date, start_time, end_time,
              hospital_id, study_type, specialty_constraint, desired_coverage, is_mandatory,
              created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for s in shifts {
            stmt.execute(params![
                s.id,
                s.schedule_version_id,
                s.shift_type,
                s.schedule_date,
                s.start_time,
                s.end_time,
                s.hospital_id,
                s.study_type,
                s.specialty_constraint,
                s.desired_coverage,
                s.is_mandatory,
                s.created_at,
                s.created_by,
            ])?;
        }
        Ok(())
    }

    fn find_shift_instance(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
        date: NaiveDate,
        shift_type: &str,
    ) -> anyhow::Result<Option<ShiftInstance>> {
        tx.query_row(
            "SELECT id, schedule_version_id, shift_type, schedule_date, start_time, end_time,
                    hospital_id, study_type, specialty_constraint, desired_coverage, is_mandatory,
                    created_at, created_by
             FROM shift_instances
             WHERE schedule_version_id = ?1 AND schedule_date = ?2 AND shift_type = ?3",
            params![schedule_version_id, date, shift_type],
            row_to_shift_instance,
        )
        .optional()
        .map_err(Into::into)
    }

    fn list_shift_instances_by_version(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
    ) -> anyhow::Result<Vec<ShiftInstance>> {
        let mut stmt = tx.prepare(
            "SELECT id, schedule_version_id, shift_type, schedule_date, start_time, end_time,
                    hospital_id, study_type, specialty_constraint, desired_coverage, is_mandatory,
                    created_at, created_by
             FROM shift_instances
             WHERE schedule_version_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![schedule_version_id], row_to_shift_instance)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_scrape_batch(&self, tx: &Transaction, batch: &ScrapeBatch) -> anyhow::Result<()> {
        tx.execute(
            "INSERT INTO scrape_batches
             (id, hospital_id, state, window_start, window_end, scraped_at, completed_at,
              row_count, ingest_checksum, error_message, created_at, created_by, deleted_at, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                batch.id,
                batch.hospital_id,
                batch.state.as_str(),
                batch.window_start,
                batch.window_end,
                batch.scraped_at,
                batch.completed_at,
                batch.row_count,
                batch.ingest_checksum,
                batch.error_message,
                batch.created_at,
                batch.created_by,
                batch.deleted_at,
                batch.archived_at,
            ],
        )?;
        Ok(())
    }

    fn update_scrape_batch(&self, tx: &Transaction, batch: &ScrapeBatch) -> anyhow::Result<()> {
        tx.execute(
            "UPDATE scrape_batches
             SET state = ?2, completed_at = ?3, row_count = ?4, ingest_checksum = ?5,
                 error_message = ?6, deleted_at = ?7, archived_at = ?8
             WHERE id = ?1",
            params![
                batch.id,
                batch.state.as_str(),
                batch.completed_at,
                batch.row_count,
                batch.ingest_checksum,
                batch.error_message,
                batch.deleted_at,
                batch.archived_at,
            ],
        )?;
        Ok(())
    }

    /// Soft-deletes a `ScrapeBatch`. Never touches `schedule_versions` —
    /// `scrape_batch_ref` is a soft association with no cascade.
    fn soft_delete_scrape_batch(
        &self,
        tx: &Transaction,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        tx.execute(
            "UPDATE scrape_batches SET deleted_at = ?2 WHERE id = ?1",
            params![id, deleted_at],
        )?;
        Ok(())
    }

    fn insert_assignments(&self, tx: &Transaction, assignments: &[Assignment]) -> anyhow::Result<()> {
        let mut stmt = tx.prepare(
            "INSERT INTO assignments
             (id, person_id, shift_instance_id, schedule_date, original_shift_type, source,
              created_at, created_by, deleted_at, deleted_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for a in assignments {
            stmt.execute(params![
                a.id,
                a.person_id,
                a.shift_instance_id,
                a.schedule_date,
                a.original_shift_type,
                a.source.as_str(),
                a.created_at,
                a.created_by,
                a.deleted_at,
                a.deleted_by,
            ])?;
        }
        Ok(())
    }

    fn find_assignment(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<Assignment>> {
        tx.query_row(
            "SELECT id, person_id, shift_instance_id, schedule_date, original_shift_type, source,
                    created_at, created_by, deleted_at, deleted_by
             FROM assignments WHERE id = ?1",
            params![id],
            row_to_assignment,
        )
        .optional()
        .map_err(Into::into)
    }

    fn update_assignment(&self, tx: &Transaction, assignment: &Assignment) -> anyhow::Result<()> {
        tx.execute(
            "UPDATE assignments SET deleted_at = ?2, deleted_by = ?3 WHERE id = ?1",
            params![assignment.id, assignment.deleted_at, assignment.deleted_by],
        )?;
        Ok(())
    }

    fn insert_person(&self, tx: &Transaction, person: &Person) -> anyhow::Result<()> {
        let aliases = serde_json::to_string(&person.aliases)?;
        tx.execute(
            "INSERT INTO persons (id, email, name, specialty, aliases, active, created_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                person.id,
                person.email,
                person.name,
                specialty_str(person.specialty),
                aliases,
                person.active,
                person.created_at,
                person.deleted_at,
            ],
        )?;
        Ok(())
    }

    fn find_person(&self, tx: &Transaction, id: Uuid) -> anyhow::Result<Option<Person>> {
        tx.query_row(
            "SELECT id, email, name, specialty, aliases, active, created_at, deleted_at
             FROM persons WHERE id = ?1",
            params![id],
            row_to_person,
        )
        .optional()
        .map_err(Into::into)
    }

    fn update_person(&self, tx: &Transaction, person: &Person) -> anyhow::Result<()> {
        tx.execute(
            "UPDATE persons SET active = ?2, deleted_at = ?3 WHERE id = ?1",
            params![person.id, person.active, person.deleted_at],
        )?;
        Ok(())
    }

    fn find_person_by_email_or_alias(&self, candidate: &str) -> anyhow::Result<Option<Person>> {
        let conn = self.conn.lock().unwrap();
        let needle = candidate.trim().to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT id, email, name, specialty, aliases, active, created_at, deleted_at
             FROM persons WHERE deleted_at IS NULL",
        )?;
        let mut rows = stmt.query_map([], row_to_person)?;
        while let Some(person) = rows.next().transpose()? {
            if person.matches(&needle) {
                return Ok(Some(person));
            }
        }
        Ok(None)
    }

    fn find_persons_by_candidates(
        &self,
        candidates: &[String],
    ) -> anyhow::Result<std::collections::HashMap<String, Person>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, email, name, specialty, aliases, active, created_at, deleted_at
             FROM persons WHERE deleted_at IS NULL",
        )?;
        let active_persons: Vec<Person> = stmt
            .query_map([], row_to_person)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut resolved = std::collections::HashMap::new();
        for candidate in candidates {
            let needle = candidate.trim().to_lowercase();
            if let Some(person) = active_persons.iter().find(|p| p.matches(&needle)) {
                resolved.insert(candidate.clone(), person.clone());
            }
        }
        Ok(resolved)
    }

    fn coverage_by_position(
        &self,
        tx: &Transaction,
        schedule_version_id: Uuid,
    ) -> anyhow::Result<BTreeMap<String, u64>> {
        let mut stmt = tx.prepare(
            "SELECT si.shift_type AS position, COUNT(*) AS n
             FROM shift_instances si
             JOIN assignments a ON a.shift_instance_id = si.id
             WHERE si.schedule_version_id = ?1 AND a.deleted_at IS NULL
             GROUP BY si.shift_type",
        )?;
        let rows = stmt.query_map(params![schedule_version_id], |row| {
            let position: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((position, count as u64))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (position, count) = row?;
            out.insert(position, count);
        }
        Ok(out)
    }

    fn insert_coverage_calculation(
        &self,
        tx: &Transaction,
        calc: &CoverageCalculation,
    ) -> anyhow::Result<()> {
        let coverage_by_position = serde_json::to_string(&calc.coverage_by_position)?;
        let coverage_summary = serde_json::to_string(&calc.coverage_summary)?;
        let validation_errors = serde_json::to_string(&calc.validation_errors)?;
        tx.execute(
            "INSERT INTO coverage_calculations
             (id, schedule_version_id, hospital_id, calculated_at, period_start, period_end,
              coverage_by_position, coverage_summary, validation_errors, query_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                calc.id,
                calc.schedule_version_id,
                calc.hospital_id,
                calc.calculated_at,
                calc.period_start,
                calc.period_end,
                coverage_by_position,
                coverage_summary,
                validation_errors,
                calc.query_count,
            ],
        )?;
        Ok(())
    }

    fn insert_audit_log(&self, tx: &Transaction, log: &AuditLog) -> anyhow::Result<()> {
        tx.execute(
            "INSERT INTO audit_log (id, user_id, action, resource, old_values, new_values, timestamp, ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                log.id,
                log.user_id,
                log.action,
                log.resource,
                log.old_values.as_ref().map(|v| v.to_string()),
                log.new_values.as_ref().map(|v| v.to_string()),
                log.timestamp,
                log.ip,
            ],
        )?;
        Ok(())
    }
}

fn row_to_schedule_version(row: &rusqlite::Row) -> rusqlite::Result<ScheduleVersion> {
    let status_str: String = row.get(2)?;
    Ok(ScheduleVersion {
        id: row.get(0)?,
        hospital_id: row.get(1)?,
        status: VersionStatus::parse(&status_str).unwrap_or(VersionStatus::Staging),
        effective_start: row.get(3)?,
        effective_end: row.get(4)?,
        scrape_batch_ref: row.get(5)?,
        created_at: row.get(6)?,
        created_by: row.get(7)?,
        updated_at: row.get(8)?,
        updated_by: row.get(9)?,
        deleted_at: row.get(10)?,
        deleted_by: row.get(11)?,
    })
}

fn row_to_shift_instance(row: &rusqlite::Row) -> rusqlite::Result<ShiftInstance> {
    Ok(ShiftInstance {
        id: row.get(0)?,
        schedule_version_id: row.get(1)?,
        shift_type: row.get(2)?,
        schedule_date: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        hospital_id: row.get(6)?,
        study_type: row.get(7)?,
        specialty_constraint: row.get(8)?,
        desired_coverage: row.get(9)?,
        is_mandatory: row.get(10)?,
        created_at: row.get(11)?,
        created_by: row.get(12)?,
    })
}

fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<Assignment> {
    let source_str: String = row.get(5)?;
    let source = match source_str.as_str() {
        "MANUAL" => crate::models::AssignmentSource::Manual,
        "OVERRIDE" => crate::models::AssignmentSource::Override,
        _ => crate::models::AssignmentSource::Amion,
    };
    Ok(Assignment {
        id: row.get(0)?,
        person_id: row.get(1)?,
        shift_instance_id: row.get(2)?,
        schedule_date: row.get(3)?,
        original_shift_type: row.get(4)?,
        source,
        created_at: row.get(6)?,
        created_by: row.get(7)?,
        deleted_at: row.get(8)?,
        deleted_by: row.get(9)?,
    })
}

fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
    let specialty_str: String = row.get(3)?;
    let aliases_json: String = row.get(4)?;
    let aliases: Vec<String> = serde_json::from_str(&aliases_json).unwrap_or_default();
    Ok(Person {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        specialty: parse_specialty(&specialty_str),
        aliases,
        active: row.get(5)?,
        created_at: row.get(6)?,
        deleted_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    #[test]
    fn insert_and_find_production_version() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut version = ScheduleVersion::new_staging(hospital, Utc::now(), Utc::now(), user);
        version.promote(user).unwrap();

        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            Ok(())
        })
        .unwrap();

        let found = repo
            .run_in_transaction(|tx| Ok(repo.find_production_version(tx, hospital)?))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, version.id);
        assert_eq!(found.status, VersionStatus::Production);
    }

    #[test]
    fn coverage_by_position_counts_active_assignments_only() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let version = ScheduleVersion::new_staging(hospital, Utc::now(), Utc::now(), user);

        let shift = ShiftInstance::new(
            version.id,
            "Technologist",
            chrono::NaiveDate::from_ymd_opt(2025, 11, 15).unwrap(),
            chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            hospital,
            None,
            None,
            2,
            true,
            user,
        );

        let person = Uuid::new_v4();
        let active = crate::models::Assignment::new(
            person,
            shift.id,
            shift.schedule_date,
            "Technologist",
            crate::models::AssignmentSource::Amion,
            user,
        );
        let mut deleted = crate::models::Assignment::new(
            person,
            shift.id,
            shift.schedule_date,
            "Technologist",
            crate::models::AssignmentSource::Amion,
            user,
        );
        deleted.deleted_at = Some(Utc::now());
        deleted.deleted_by = Some(user);

        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            repo.insert_shift_instances(tx, &[shift.clone()])?;
            repo.insert_assignments(tx, &[active, deleted])?;
            Ok(())
        })
        .unwrap();

        let counts = repo
            .run_in_transaction(|tx| Ok(repo.coverage_by_position(tx, version.id)?))
            .unwrap();
        assert_eq!(counts.get("Technologist"), Some(&1));
    }

    #[test]
    fn soft_deleting_scrape_batch_does_not_touch_schedule_version() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let version = ScheduleVersion::new_staging(hospital, Utc::now(), Utc::now(), user);
        let batch = ScrapeBatch::new_pending(hospital, Utc::now(), Utc::now(), user);

        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            repo.insert_scrape_batch(tx, &batch)?;
            repo.soft_delete_scrape_batch(tx, batch.id, Utc::now())?;
            Ok(())
        })
        .unwrap();

        let still_there = repo
            .run_in_transaction(|tx| Ok(repo.find_production_version(tx, hospital)?))
            .unwrap();
        // version is STAGING, not PRODUCTION, so this just proves the query
        // still runs cleanly post-delete; the real assertion is no panic/FK error.
        assert!(still_there.is_none());
    }

    #[test]
    fn person_soft_delete_and_restore_round_trip_through_storage() {
        let repo = repo();
        let mut person = Person::new("jane.doe@hospital.org", "Jane Doe", Specialty::Both);

        repo.run_in_transaction(|tx| {
            repo.insert_person(tx, &person)?;
            Ok(())
        })
        .unwrap();

        person.soft_delete(Utc::now());
        repo.run_in_transaction(|tx| {
            repo.update_person(tx, &person)?;
            Ok(())
        })
        .unwrap();
        let loaded = repo
            .run_in_transaction(|tx| Ok(repo.find_person(tx, person.id)?))
            .unwrap()
            .unwrap();
        assert!(loaded.deleted_at.is_some());
        assert!(!loaded.active);

        person.restore();
        repo.run_in_transaction(|tx| {
            repo.update_person(tx, &person)?;
            Ok(())
        })
        .unwrap();
        let loaded = repo
            .run_in_transaction(|tx| Ok(repo.find_person(tx, person.id)?))
            .unwrap()
            .unwrap();
        assert!(loaded.deleted_at.is_none());
        assert!(loaded.active);
    }

    #[test]
    fn assignment_soft_delete_and_restore_round_trip_through_storage() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let version = ScheduleVersion::new_staging(hospital, Utc::now(), Utc::now(), user);
        let shift = ShiftInstance::new(
            version.id,
            "Technologist",
            chrono::NaiveDate::from_ymd_opt(2025, 11, 15).unwrap(),
            chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            hospital,
            None,
            None,
            2,
            true,
            user,
        );
        let mut assignment = Assignment::new(
            Uuid::new_v4(),
            shift.id,
            shift.schedule_date,
            "Technologist",
            crate::models::AssignmentSource::Amion,
            user,
        );

        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            repo.insert_shift_instances(tx, &[shift.clone()])?;
            repo.insert_assignments(tx, &[assignment.clone()])?;
            Ok(())
        })
        .unwrap();

        let by = Uuid::new_v4();
        assignment.soft_delete(by);
        repo.run_in_transaction(|tx| {
            repo.update_assignment(tx, &assignment)?;
            Ok(())
        })
        .unwrap();
        let loaded = repo
            .run_in_transaction(|tx| Ok(repo.find_assignment(tx, assignment.id)?))
            .unwrap()
            .unwrap();
        assert!(!loaded.is_active());
        assert_eq!(loaded.deleted_by, Some(by));

        assignment.restore();
        repo.run_in_transaction(|tx| {
            repo.update_assignment(tx, &assignment)?;
            Ok(())
        })
        .unwrap();
        let loaded = repo
            .run_in_transaction(|tx| Ok(repo.find_assignment(tx, assignment.id)?))
            .unwrap()
            .unwrap();
        assert!(loaded.is_active());
    }
}
