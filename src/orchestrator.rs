use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::amion::{ScrapedShifts, scrape};
use crate::assignment_mapper::{RepositoryPersonResolver, map_assignments, resolve_people};
use crate::config::ImportConfig;
use crate::coverage::calculate_coverage;
use crate::error::PipelineError;
use crate::fetcher::HttpFetcher;
use crate::html::extractor::SelectorConfig;
use crate::materializer::{build_shift_instances, materialize};
use crate::models::{Assignment, AuditLog, CoverageCalculation, Person, ScheduleVersion, ScrapeBatch};
use crate::ods::read_ods;
use crate::rate_limiter::RateLimiter;
use crate::repository::Repository;
use crate::validation::ValidationResult;
use crate::worker_pool::WorkerPool;

/// Everything needed to run one import end to end: the two source
/// documents, the hospital/window they apply to, and the acting user for
/// audit attribution.
pub struct ImportRequest {
    pub hospital_id: Uuid,
    pub ods_bytes: Vec<u8>,
    pub amion_base_url: String,
    pub start_month: (i32, u32),
    pub month_count: usize,
    pub effective_start: DateTime<Utc>,
    pub effective_end: DateTime<Utc>,
    pub acting_user: Uuid,
}

/// The terminal outcome of a full `run_import`. Phase 2 never prevents
/// Phase 3 from running — `scrape_batch` may be `Some` with `state =
/// FAILED` while `coverage` is still populated from whatever assignments
/// (possibly zero) Phase 2 managed to persist.
pub struct ImportResult {
    pub schedule_version: ScheduleVersion,
    pub scrape_batch: Option<ScrapeBatch>,
    pub coverage: Option<CoverageCalculation>,
    pub validation: ValidationResult,
}

fn ingest_checksum(rows: &ScrapedShifts) -> String {
    let mut hasher = Sha256::new();
    for shift in &rows.shifts {
        hasher.update(shift.date.as_bytes());
        hasher.update(shift.shift_type.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Runs Phase 1 (ODS import), then Phase 2 (Amion scraping and assignment
/// mapping), then Phase 3 (coverage calculation), in that order and never
/// out of order. Only a Phase 1 failure — malformed/oversized/non-ZIP
/// input — aborts the whole import; Phase 2 failures degrade to an empty
/// assignment set and Phase 3 still runs over whatever Phase 1 produced.
pub async fn run_import(
    repo: &dyn Repository,
    config: &ImportConfig,
    request: ImportRequest,
    token: &CancellationToken,
) -> Result<ImportResult, PipelineError> {
    let mut validation = ValidationResult::new();

    // Phase 1: ODS Import.
    tracing::info!(hospital_id = %request.hospital_id, "phase 1: ods import starting");
    let (document, ods_validation) = read_ods(
        &request.ods_bytes,
        config.ods.max_bytes,
        config.ods.max_sheets,
        config.ods.max_rows_per_sheet,
        config.ods.max_cols_per_row,
    )?;
    validation.merge(&ods_validation);

    let schedule_version = ScheduleVersion::new_staging(
        request.hospital_id,
        request.effective_start,
        request.effective_end,
        request.acting_user,
    );
    let (shift_instances, materializer_validation) = build_shift_instances(
        &document,
        schedule_version.id,
        request.hospital_id,
        request.acting_user,
    );
    validation.merge(&materializer_validation);

    repo.run_in_transaction(|tx| {
        repo.insert_schedule_version(tx, &schedule_version)?;
        materialize(repo, tx, &shift_instances)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                request.acting_user,
                "schedule_version.created",
                schedule_version.id.to_string(),
                None,
                Some(serde_json::json!({"status": schedule_version.status.as_str()})),
            ),
        )?;
        Ok(())
    })?;
    tracing::info!(
        schedule_version_id = %schedule_version.id,
        shift_count = shift_instances.len(),
        "phase 1 complete"
    );

    if token.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    // Phase 2: Amion Scraping / Assignment Mapping. Non-critical: any
    // failure here degrades the result but never aborts the pipeline.
    tracing::info!("phase 2: amion scraping starting");
    let scrape_batch = match run_phase_two(repo, config, &request, &schedule_version, token).await {
        Ok((batch, phase_validation)) => {
            validation.merge(&phase_validation);
            Some(batch)
        }
        Err(e) => {
            tracing::error!(error = %e, "phase 2 failed outright");
            validation.add_warning("", format!("Amion scraping phase failed: {e}"));
            None
        }
    };

    // Phase 3: Coverage Calculation. Always runs, even over zero assignments.
    tracing::info!("phase 3: coverage calculation starting");
    let period_start = NaiveDate::from_ymd_opt(request.start_month.0, request.start_month.1, 1)
        .unwrap_or(schedule_version.effective_start.date_naive());
    let period_end = schedule_version.effective_end.date_naive();
    let coverage = repo
        .run_in_transaction(|tx| {
            Ok(calculate_coverage(
                repo,
                tx,
                schedule_version.id,
                request.hospital_id,
                period_start,
                period_end,
            )?)
        })
        .map_err(PipelineError::Internal)?;
    tracing::info!(query_count = coverage.query_count, "phase 3 complete");

    Ok(ImportResult {
        schedule_version,
        scrape_batch,
        coverage: Some(coverage),
        validation,
    })
}

async fn run_phase_two(
    repo: &dyn Repository,
    config: &ImportConfig,
    request: &ImportRequest,
    schedule_version: &ScheduleVersion,
    token: &CancellationToken,
) -> anyhow::Result<(ScrapeBatch, ValidationResult)> {
    let mut validation = ValidationResult::new();

    let mut batch = ScrapeBatch::new_pending(
        request.hospital_id,
        request.effective_start,
        request.effective_end,
        request.acting_user,
    );
    repo.run_in_transaction(|tx| {
        repo.insert_scrape_batch(tx, &batch)?;
        Ok(())
    })?;

    let fetcher = HttpFetcher::new(&config.fetcher)?;
    let pool = WorkerPool::new(config.worker_pool.max_workers, config.worker_pool.max_queue_size);
    let limiter = Arc::new(RateLimiter::new(std::time::Duration::from_millis(
        config.rate_limiter.min_interval_ms,
    )));
    let selectors = SelectorConfig::default();

    let scraped = scrape(
        fetcher,
        pool,
        limiter,
        selectors,
        &request.amion_base_url,
        request.start_month,
        request.month_count,
        token,
    )
    .await;

    validation.merge(&scraped.warnings);
    // Per-month scrape failures degrade Phase 2 (non-critical) rather than
    // failing the overall import, so they surface as warnings, not errors —
    // an `errors` entry here would flip the response envelope into a
    // validation failure even though the pipeline completed successfully.
    for err in &scraped.errors {
        validation.add_warning(err.month.as_str(), format!("{:?}: {}", err.kind, err.message));
    }
    if scraped.duplicate_count > 0 {
        validation.add_info("", format!("{} duplicate rows dropped", scraped.duplicate_count));
    }

    let all_months_failed = scraped.months_failed > 0 && scraped.months_processed == 0;

    if all_months_failed {
        repo.run_in_transaction(|tx| {
            batch.mark_failed("all target months failed to scrape")?;
            repo.update_scrape_batch(tx, &batch)?;
            Ok(())
        })?;
        return Ok((batch, validation));
    }

    // `resolve_people` is async (it goes through the `PersonResolver` trait,
    // which a future directory-backed implementation might need to await
    // on), so it cannot run inside the synchronous `rusqlite::Transaction`
    // closure below. Its failure is caught explicitly here rather than
    // propagated with `?` so `batch` never gets stranded in PENDING — every
    // path out of this function past the PENDING insert above now ends in
    // either `mark_complete` or `mark_failed`.
    let resolver = RepositoryPersonResolver { repo };
    let resolved = match resolve_people(&resolver, &scraped.shifts).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(error = %e, "phase 2 person resolution failed");
            repo.run_in_transaction(|tx| {
                batch.mark_failed(format!("person resolution failed: {e}"))?;
                repo.update_scrape_batch(tx, &batch)?;
                Ok(())
            })?;
            validation.add_warning("", format!("Amion person resolution failed: {e}"));
            return Ok((batch, validation));
        }
    };

    // Mapping, the assignment insert, and the batch's completion update all
    // happen in one transaction: `map_assignments` only reads inside it, so
    // an error here leaves `batch` untouched (still PENDING) and nothing
    // committed, letting the `Err` arm below transition it to FAILED cleanly.
    let checksum = ingest_checksum(&scraped);
    let mapping = repo.run_in_transaction(|tx| {
        let (assignments, mapper_validation) =
            map_assignments(tx, repo, &resolved, schedule_version.id, &scraped.shifts, request.acting_user)?;
        if !assignments.is_empty() {
            repo.insert_assignments(tx, &assignments)?;
        }
        batch.mark_complete(assignments.len() as i64, checksum)?;
        repo.update_scrape_batch(tx, &batch)?;
        Ok((assignments, mapper_validation))
    });

    let (assignments, mapper_validation) = match mapping {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "phase 2 assignment mapping failed");
            repo.run_in_transaction(|tx| {
                batch.mark_failed(format!("assignment mapping failed: {e}"))?;
                repo.update_scrape_batch(tx, &batch)?;
                Ok(())
            })?;
            validation.add_warning("", format!("Amion assignment mapping failed: {e}"));
            return Ok((batch, validation));
        }
    };
    validation.merge(&mapper_validation);

    tracing::info!(
        scrape_batch_id = %batch.id,
        assignments = assignments.len(),
        months_failed = scraped.months_failed,
        "phase 2 complete"
    );

    Ok((batch, validation))
}

/// Promotes a STAGING `ScheduleVersion` to PRODUCTION, rejecting the
/// attempt (with no audit entry) if another version for the same
/// hospital already holds the PRODUCTION slot.
pub fn promote_schedule_version(
    repo: &dyn Repository,
    schedule_version_id: Uuid,
    acting_user: Uuid,
) -> Result<ScheduleVersion, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut version = repo
            .find_schedule_version(tx, schedule_version_id)?
            .ok_or_else(|| anyhow::anyhow!("schedule version {schedule_version_id} not found"))?;

        if let Some(existing) = repo.find_production_version(tx, version.hospital_id)? {
            if existing.id != version.id {
                return Err(PipelineError::InvalidVersionStateTransition(format!(
                    "hospital {} already has production version {}",
                    version.hospital_id, existing.id
                ))
                .into());
            }
        }

        version.promote(acting_user)?;
        repo.update_schedule_version(tx, &version)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "schedule_version.promoted",
                version.id.to_string(),
                Some(serde_json::json!({"status": "STAGING"})),
                Some(serde_json::json!({"status": "PRODUCTION"})),
            ),
        )?;
        Ok(version)
    })
    .map_err(|e| match e.downcast::<PipelineError>() {
        Ok(pipeline_err) => pipeline_err,
        Err(other) => PipelineError::Internal(other),
    })
}

/// Archives a PRODUCTION `ScheduleVersion`, rejecting the attempt if it
/// isn't currently PRODUCTION. `ARCHIVED` is terminal — there is no
/// transition back out of it.
pub fn archive_schedule_version(
    repo: &dyn Repository,
    schedule_version_id: Uuid,
    acting_user: Uuid,
) -> Result<ScheduleVersion, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut version = repo
            .find_schedule_version(tx, schedule_version_id)?
            .ok_or_else(|| anyhow::anyhow!("schedule version {schedule_version_id} not found"))?;

        version.archive(acting_user)?;
        repo.update_schedule_version(tx, &version)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "schedule_version.archived",
                version.id.to_string(),
                Some(serde_json::json!({"status": "PRODUCTION"})),
                Some(serde_json::json!({"status": "ARCHIVED"})),
            ),
        )?;
        Ok(version)
    })
    .map_err(|e| match e.downcast::<PipelineError>() {
        Ok(pipeline_err) => pipeline_err,
        Err(other) => PipelineError::Internal(other),
    })
}

/// Soft-deletes a `Person` and records the transition in the audit log.
/// Idempotent: soft-deleting an already-deleted person just overwrites
/// `deleted_at`.
pub fn soft_delete_person(
    repo: &dyn Repository,
    person_id: Uuid,
    acting_user: Uuid,
) -> Result<Person, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut person = repo
            .find_person(tx, person_id)?
            .ok_or_else(|| anyhow::anyhow!("person {person_id} not found"))?;

        let was_active = person.active;
        person.soft_delete(Utc::now());
        repo.update_person(tx, &person)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "person.soft_deleted",
                person.id.to_string(),
                Some(serde_json::json!({"active": was_active})),
                Some(serde_json::json!({"active": false})),
            ),
        )?;
        Ok(person)
    })
    .map_err(PipelineError::Internal)
}

/// Restores a soft-deleted `Person`, clearing `deleted_at` and reactivating
/// them.
pub fn restore_person(
    repo: &dyn Repository,
    person_id: Uuid,
    acting_user: Uuid,
) -> Result<Person, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut person = repo
            .find_person(tx, person_id)?
            .ok_or_else(|| anyhow::anyhow!("person {person_id} not found"))?;

        person.restore();
        repo.update_person(tx, &person)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "person.restored",
                person.id.to_string(),
                Some(serde_json::json!({"active": false})),
                Some(serde_json::json!({"active": true})),
            ),
        )?;
        Ok(person)
    })
    .map_err(PipelineError::Internal)
}

/// Soft-deletes an `Assignment` and records the transition in the audit
/// log. Never touches the `shift_instances`/`coverage_calculations` it was
/// part of — those stay immutable once created.
pub fn soft_delete_assignment(
    repo: &dyn Repository,
    assignment_id: Uuid,
    acting_user: Uuid,
) -> Result<Assignment, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut assignment = repo
            .find_assignment(tx, assignment_id)?
            .ok_or_else(|| anyhow::anyhow!("assignment {assignment_id} not found"))?;

        assignment.soft_delete(acting_user);
        repo.update_assignment(tx, &assignment)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "assignment.soft_deleted",
                assignment.id.to_string(),
                Some(serde_json::json!({"deleted_at": null})),
                Some(serde_json::json!({"deleted_at": assignment.deleted_at})),
            ),
        )?;
        Ok(assignment)
    })
    .map_err(PipelineError::Internal)
}

/// Restores a soft-deleted `Assignment`. This never retroactively changes
/// a prior `CoverageCalculation` snapshot — it only affects assignments a
/// future coverage run will see.
pub fn restore_assignment(
    repo: &dyn Repository,
    assignment_id: Uuid,
    acting_user: Uuid,
) -> Result<Assignment, PipelineError> {
    repo.run_in_transaction(|tx| {
        let mut assignment = repo
            .find_assignment(tx, assignment_id)?
            .ok_or_else(|| anyhow::anyhow!("assignment {assignment_id} not found"))?;

        assignment.restore();
        repo.update_assignment(tx, &assignment)?;
        repo.insert_audit_log(
            tx,
            &AuditLog::new(
                acting_user,
                "assignment.restored",
                assignment.id.to_string(),
                Some(serde_json::json!({"deleted_at": "non-null"})),
                Some(serde_json::json!({"deleted_at": null})),
            ),
        )?;
        Ok(assignment)
    })
    .map_err(PipelineError::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;

    #[test]
    fn promoting_while_another_version_is_production_is_rejected_without_audit() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut v1 = ScheduleVersion::new_staging(hospital, now, now, user);
        let v2 = ScheduleVersion::new_staging(hospital, now, now, user);
        v1.promote(user).unwrap();

        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &v1)?;
            repo.insert_schedule_version(tx, &v2)?;
            Ok(())
        })
        .unwrap();

        let err = promote_schedule_version(&repo, v2.id, user).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidVersionStateTransition(_)));

        let reloaded = repo
            .run_in_transaction(|tx| Ok(repo.find_schedule_version(tx, v2.id)?))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, crate::models::VersionStatus::Staging, "rejected promotion must not mutate state");
    }

    #[test]
    fn archiving_a_production_version_writes_an_audit_entry() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut version = ScheduleVersion::new_staging(hospital, now, now, user);
        version.promote(user).unwrap();
        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            Ok(())
        })
        .unwrap();

        let archived = archive_schedule_version(&repo, version.id, user).unwrap();
        assert_eq!(archived.status, crate::models::VersionStatus::Archived);

        let reloaded = repo
            .run_in_transaction(|tx| Ok(repo.find_schedule_version(tx, version.id)?))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, crate::models::VersionStatus::Archived);
    }

    #[test]
    fn archiving_a_staging_version_is_rejected() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let version = ScheduleVersion::new_staging(hospital, now, now, user);
        repo.run_in_transaction(|tx| {
            repo.insert_schedule_version(tx, &version)?;
            Ok(())
        })
        .unwrap();

        let err = archive_schedule_version(&repo, version.id, user).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidVersionStateTransition(_)));

        let reloaded = repo
            .run_in_transaction(|tx| Ok(repo.find_schedule_version(tx, version.id)?))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.status, crate::models::VersionStatus::Staging, "rejected archive must not mutate state");
    }

    #[test]
    fn soft_deleting_and_restoring_a_person_writes_audit_entries() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let person = Person::new("jane.doe@hospital.org", "Jane Doe", crate::models::Specialty::Both);

        repo.run_in_transaction(|tx| {
            repo.insert_person(tx, &person)?;
            Ok(())
        })
        .unwrap();

        let deleted = soft_delete_person(&repo, person.id, user).unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(!deleted.active);

        let restored = restore_person(&repo, person.id, user).unwrap();
        assert!(restored.deleted_at.is_none());
        assert!(restored.active);
    }

    #[test]
    fn soft_deleting_a_missing_assignment_is_an_internal_error() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let err = soft_delete_assignment(&repo, Uuid::new_v4(), user).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }

    #[test]
    fn soft_deleting_and_restoring_an_assignment_writes_audit_entries() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let hospital = Uuid::new_v4();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let version = ScheduleVersion::new_staging(hospital, now, now, user);
        let shift = crate::models::ShiftInstance::new(
            version.id,
            "Technologist",
            NaiveDate::from_ymd_opt(2025, 11, 15).unwrap(),
            chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            hospital,
            None,
            None,
            2,
            true,
            user,
        );
        let assignment = Assignment::new(
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

        let deleted = soft_delete_assignment(&repo, assignment.id, user).unwrap();
        assert!(!deleted.is_active());

        let restored = restore_assignment(&repo, assignment.id, user).unwrap();
        assert!(restored.is_active());
    }
}
