//! End-to-end exercises of the three-phase import pipeline against a real
//! in-memory SQLite repository and a mocked Amion HTTP endpoint.

use std::io::{Cursor, Write};

use chrono::{TimeZone, Utc};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shiftsync_import::config::{FetcherConfig, ImportConfig, RateLimiterConfig};
use shiftsync_import::models::{Person, Specialty};
use shiftsync_import::orchestrator::{run_import, ImportRequest};
use shiftsync_import::repository::{Repository, SqliteRepository};

const CONTENT_PART: &str = "content.xml";

fn cell(value: &str) -> String {
    format!(r#"<table:table-cell office:value-type="string"><text:p>{value}</text:p></table:table-cell>"#)
}

fn empty_cell() -> String {
    "<table:table-cell/>".to_string()
}

fn row(cells: &[String]) -> String {
    let body: String = cells
        .iter()
        .map(|c| if c.is_empty() { empty_cell() } else { cell(c) })
        .collect();
    format!("<table:table-row>{body}</table:table-row>")
}

/// One sheet: a header row followed by `rows`, each already laid out in the
/// materializer's fixed column order (date, shift_type, start, end,
/// study_type, specialty_constraint, desired_coverage, is_mandatory).
fn sheet_xml(name: &str, rows: &[Vec<String>]) -> String {
    let header = row(&[
        "date", "shift_type", "start", "end", "study", "specialty", "coverage", "mandatory",
    ]
    .map(String::from));
    let body: String = rows.iter().map(|r| row(r)).collect();
    format!(r#"<table:table table:name="{name}">{header}{body}</table:table>"#)
}

/// One month's worth of alternating Technologist/Radiologist shift rows,
/// one per day from `1` to `day_count`.
fn alternating_shift_rows(year: i32, month: u32, day_count: u32) -> Vec<Vec<String>> {
    (1..=day_count)
        .map(|day| {
            let shift_type = if day % 2 == 0 { "Radiologist" } else { "Technologist" };
            vec![
                format!("{year:04}-{month:02}-{day:02}"),
                shift_type.to_string(),
                "08:00".to_string(),
                "16:00".to_string(),
                String::new(),
                String::new(),
                "2".to_string(),
                "true".to_string(),
            ]
        })
        .collect()
}

fn build_ods(sheets_xml: &str) -> Vec<u8> {
    let content = format!(
        r#"<?xml version="1.0"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0"
    xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0"
    xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
  <office:body>
    <office:spreadsheet>{sheets_xml}</office:spreadsheet>
  </office:body>
</office:document-content>"#
    );

    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer = zip::ZipWriter::new(cursor);
        let options =
            zip::write::FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file(CONTENT_PART, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf
}

fn amion_table_html(rows: &[(&str, &str, &str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(date, shift_type, start, end, location)| {
            format!(
                "<tr><td>{date}</td><td>{shift_type}</td><td>{start}</td><td>{end}</td><td>{location}</td><td>1</td></tr>"
            )
        })
        .collect();
    format!("<table><thead><tr><th>Date</th></tr></thead><tbody>{body}</tbody></table>")
}

fn test_config() -> ImportConfig {
    let mut config = ImportConfig::default();
    config.rate_limiter = RateLimiterConfig { min_interval_ms: 5 };
    config.fetcher = FetcherConfig {
        max_retries: 0,
        ..FetcherConfig::default()
    };
    config
}

fn far_window() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap(),
    )
}

/// Scenario 1: a clean 3-month import — ODS rows all valid, Amion returns
/// matching rows for the first two months and an empty table for the third.
#[tokio::test]
async fn happy_path_three_months_produces_coverage_with_no_errors() {
    let server = MockServer::start().await;
    let repo = SqliteRepository::open_in_memory().unwrap();
    let hospital = Uuid::new_v4();
    let acting_user = Uuid::new_v4();

    let person = Person::new("tech.person@hospital.org", "Tech Person", Specialty::Both);
    repo.run_in_transaction(|tx| {
        repo.insert_person(tx, &person)?;
        Ok(())
    })
    .unwrap();

    let nov_rows = alternating_shift_rows(2025, 11, 10);
    let dec_rows = alternating_shift_rows(2025, 12, 10);
    let sheets = format!("{}{}", sheet_xml("November", &nov_rows), sheet_xml("December", &dec_rows));
    let ods_bytes = build_ods(&sheets);

    Mock::given(method("GET"))
        .and(path("/schedule/2025-11"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amion_table_html(&[(
            "2025-11-01",
            "Technologist",
            "08:00",
            "16:00",
            "tech.person@hospital.org",
        )])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schedule/2025-12"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amion_table_html(&[(
            "2025-12-02",
            "Radiologist",
            "08:00",
            "16:00",
            "tech.person@hospital.org",
        )])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schedule/2026-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amion_table_html(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let (effective_start, effective_end) = far_window();
    let request = ImportRequest {
        hospital_id: hospital,
        ods_bytes,
        amion_base_url: server.uri(),
        start_month: (2025, 11),
        month_count: 3,
        effective_start,
        effective_end,
        acting_user,
    };

    let token = tokio_util::sync::CancellationToken::new();
    let config = test_config();
    let result = run_import(&repo, &config, request, &token).await.unwrap();

    assert!(result.validation.is_valid(), "errors: {:?}", result.validation.errors);

    for day in 1..=10u32 {
        let shift_type = if day % 2 == 0 { "Radiologist" } else { "Technologist" };
        let date = chrono::NaiveDate::from_ymd_opt(2025, 11, day as i32).unwrap();
        let found = repo
            .run_in_transaction(|tx| Ok(repo.find_shift_instance(tx, result.schedule_version.id, date, shift_type)?))
            .unwrap();
        assert!(found.is_some(), "missing november shift for day {day}");
    }

    let batch = result.scrape_batch.expect("scrape batch should exist");
    assert_eq!(batch.state.as_str(), "COMPLETE");

    let coverage = result.coverage.expect("coverage should have been computed");
    assert!(coverage.coverage_by_position.get("Technologist").copied().unwrap_or(0) >= 1);
    assert!(coverage.coverage_by_position.get("Radiologist").copied().unwrap_or(0) >= 1);
}

/// Scenario 2: Amion is down for every target month. Phase 1 still commits
/// and Phase 3 still runs, over zero assignments; the outage degrades the
/// result but never turns it into a fatal failure.
#[tokio::test]
async fn phase_two_total_outage_does_not_abort_the_pipeline() {
    let server = MockServer::start().await;
    let repo = SqliteRepository::open_in_memory().unwrap();
    let hospital = Uuid::new_v4();
    let acting_user = Uuid::new_v4();

    let rows = alternating_shift_rows(2025, 11, 10);
    let ods_bytes = build_ods(&sheet_xml("November", &rows));

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (effective_start, effective_end) = far_window();
    let request = ImportRequest {
        hospital_id: hospital,
        ods_bytes,
        amion_base_url: server.uri(),
        start_month: (2025, 11),
        month_count: 6,
        effective_start,
        effective_end,
        acting_user,
    };

    let token = tokio_util::sync::CancellationToken::new();
    let config = test_config();
    let result = run_import(&repo, &config, request, &token).await.unwrap();

    assert!(result.validation.is_valid(), "phase 2 outage must not be a fatal error");
    assert!(!result.validation.warnings.is_empty(), "outage must surface as warnings");

    for day in 1..=10u32 {
        let shift_type = if day % 2 == 0 { "Radiologist" } else { "Technologist" };
        let date = chrono::NaiveDate::from_ymd_opt(2025, 11, day as i32).unwrap();
        let found = repo
            .run_in_transaction(|tx| {
                Ok(repo.find_shift_instance(tx, result.schedule_version.id, date, shift_type)?)
            })
            .unwrap();
        assert!(found.is_some(), "phase 1 shifts must survive a phase 2 outage");
    }

    let batch = result.scrape_batch.expect("scrape batch should exist even when failed");
    assert_eq!(batch.state.as_str(), "FAILED");
    assert!(batch.error_message.is_some());

    let coverage = result.coverage.expect("phase 3 must still run");
    assert!(coverage.coverage_by_position.is_empty(), "no assignments were made");
}

/// Scenario 3: a truncated ZIP aborts Phase 1 entirely before any database
/// writes happen.
#[tokio::test]
async fn malformed_ods_aborts_before_any_shift_instances_are_created() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let hospital = Uuid::new_v4();
    let acting_user = Uuid::new_v4();

    let (effective_start, effective_end) = far_window();
    let request = ImportRequest {
        hospital_id: hospital,
        ods_bytes: b"PK\x03\x04not a real zip".to_vec(),
        amion_base_url: "https://amion.example".to_string(),
        start_month: (2025, 11),
        month_count: 1,
        effective_start,
        effective_end,
        acting_user,
    };

    let token = tokio_util::sync::CancellationToken::new();
    let config = test_config();
    let err = run_import(&repo, &config, request, &token).await.unwrap_err();

    assert!(matches!(err, shiftsync_import::error::PipelineError::NotAZip));

    let found = repo
        .run_in_transaction(|tx| Ok(repo.find_production_version(tx, hospital)?))
        .unwrap();
    assert!(found.is_none(), "no schedule version should have been committed");
}

/// Scenario 5: the same (date, shift_type) pair appears twice in one
/// month's scraped rows; the shared seen-set keeps only the first.
#[tokio::test]
async fn duplicate_shift_within_a_month_is_deduplicated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/schedule/2025-11"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amion_table_html(&[
            ("2025-11-15", "Technologist", "08:00", "16:00", "dup@hospital.org"),
            ("2025-11-15", "Technologist", "08:00", "16:00", "dup@hospital.org"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/schedule/2025-12"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amion_table_html(&[])))
        .mount(&server)
        .await;

    let fetcher = shiftsync_import::fetcher::HttpFetcher::new(&FetcherConfig::default()).unwrap();
    let pool = shiftsync_import::worker_pool::WorkerPool::new(5, 100);
    let limiter = std::sync::Arc::new(shiftsync_import::rate_limiter::RateLimiter::new(
        std::time::Duration::from_millis(5),
    ));
    let selectors = shiftsync_import::html::SelectorConfig::default();
    let token = tokio_util::sync::CancellationToken::new();

    let scraped = shiftsync_import::amion::scrape(
        fetcher,
        pool,
        limiter,
        selectors,
        &server.uri(),
        (2025, 11),
        2,
        &token,
    )
    .await;

    assert_eq!(scraped.shifts.len(), 1);
    assert_eq!(scraped.duplicate_count, 1);
    assert_eq!(scraped.months_processed, 2);
}

/// Scenario 6: promoting a STAGING version while another is already
/// PRODUCTION for the same hospital is rejected and mutates neither row.
#[tokio::test]
async fn promotion_conflict_leaves_both_versions_untouched() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let hospital = Uuid::new_v4();
    let acting_user = Uuid::new_v4();
    let now = Utc::now();

    let mut v1 = shiftsync_import::models::ScheduleVersion::new_staging(hospital, now, now, acting_user);
    let v2 = shiftsync_import::models::ScheduleVersion::new_staging(hospital, now, now, acting_user);
    v1.promote(acting_user).unwrap();

    repo.run_in_transaction(|tx| {
        repo.insert_schedule_version(tx, &v1)?;
        repo.insert_schedule_version(tx, &v2)?;
        Ok(())
    })
    .unwrap();

    let err = shiftsync_import::orchestrator::promote_schedule_version(&repo, v2.id, acting_user).unwrap_err();
    assert!(matches!(
        err,
        shiftsync_import::error::PipelineError::InvalidVersionStateTransition(_)
    ));

    let reloaded_v1 = repo
        .run_in_transaction(|tx| Ok(repo.find_schedule_version(tx, v1.id)?))
        .unwrap()
        .unwrap();
    let reloaded_v2 = repo
        .run_in_transaction(|tx| Ok(repo.find_schedule_version(tx, v2.id)?))
        .unwrap()
        .unwrap();
    assert_eq!(reloaded_v1.status, shiftsync_import::models::VersionStatus::Production);
    assert_eq!(reloaded_v2.status, shiftsync_import::models::VersionStatus::Staging);
}
