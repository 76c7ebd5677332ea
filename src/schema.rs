/// Idempotent DDL for the import pipeline's persisted entities, run once
/// at [`crate::repository::SqliteRepository::open`] as a single batch of
/// `CREATE TABLE IF NOT EXISTS` statements.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schedule_versions (
    id                TEXT PRIMARY KEY,
    hospital_id       TEXT NOT NULL,
    status            TEXT NOT NULL CHECK(status IN ('STAGING','PRODUCTION','ARCHIVED')),
    effective_start   TEXT NOT NULL,
    effective_end     TEXT NOT NULL,
    scrape_batch_ref  TEXT,
    created_at        TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    updated_by        TEXT NOT NULL,
    deleted_at        TEXT,
    deleted_by        TEXT
);
CREATE INDEX IF NOT EXISTS idx_schedule_versions_hospital_status
    ON schedule_versions(hospital_id, status);

CREATE TABLE IF NOT EXISTS shift_instances (
    id                     TEXT PRIMARY KEY,
    schedule_version_id    TEXT NOT NULL REFERENCES schedule_versions(id),
    shift_type             TEXT NOT NULL,
    schedule_date          TEXT NOT NULL,
    start_time             TEXT NOT NULL,
    end_time               TEXT NOT NULL,
    hospital_id            TEXT NOT NULL,
    study_type             TEXT,
    specialty_constraint   TEXT,
    desired_coverage       INTEGER NOT NULL,
    is_mandatory           INTEGER NOT NULL,
    created_at             TEXT NOT NULL,
    created_by             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shift_instances_version ON shift_instances(schedule_version_id);
CREATE INDEX IF NOT EXISTS idx_shift_instances_lookup
    ON shift_instances(schedule_version_id, schedule_date, shift_type);

CREATE TABLE IF NOT EXISTS persons (
    id          TEXT PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    specialty   TEXT NOT NULL CHECK(specialty IN ('BODY_ONLY','NEURO_ONLY','BOTH')),
    aliases     TEXT NOT NULL DEFAULT '[]',
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS assignments (
    id                   TEXT PRIMARY KEY,
    person_id            TEXT NOT NULL,
    shift_instance_id    TEXT NOT NULL REFERENCES shift_instances(id),
    schedule_date        TEXT NOT NULL,
    original_shift_type  TEXT NOT NULL,
    source               TEXT NOT NULL CHECK(source IN ('AMION','MANUAL','OVERRIDE')),
    created_at           TEXT NOT NULL,
    created_by           TEXT NOT NULL,
    deleted_at           TEXT,
    deleted_by           TEXT
);
CREATE INDEX IF NOT EXISTS idx_assignments_shift ON assignments(shift_instance_id);

CREATE TABLE IF NOT EXISTS scrape_batches (
    id                TEXT PRIMARY KEY,
    hospital_id       TEXT NOT NULL,
    state             TEXT NOT NULL CHECK(state IN ('PENDING','COMPLETE','FAILED')),
    window_start      TEXT NOT NULL,
    window_end        TEXT NOT NULL,
    scraped_at        TEXT NOT NULL,
    completed_at      TEXT,
    row_count         INTEGER NOT NULL DEFAULT 0,
    ingest_checksum   TEXT NOT NULL DEFAULT '',
    error_message     TEXT,
    created_at        TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    deleted_at        TEXT,
    archived_at       TEXT
);

CREATE TABLE IF NOT EXISTS coverage_calculations (
    id                     TEXT PRIMARY KEY,
    schedule_version_id    TEXT NOT NULL,
    hospital_id            TEXT NOT NULL,
    calculated_at          TEXT NOT NULL,
    period_start           TEXT NOT NULL,
    period_end             TEXT NOT NULL,
    coverage_by_position   TEXT NOT NULL,
    coverage_summary       TEXT NOT NULL,
    validation_errors      TEXT NOT NULL,
    query_count            INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_coverage_calculations_version
    ON coverage_calculations(schedule_version_id);

CREATE TABLE IF NOT EXISTS audit_log (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    action      TEXT NOT NULL,
    resource    TEXT NOT NULL,
    old_values  TEXT,
    new_values  TEXT,
    timestamp   TEXT NOT NULL,
    ip          TEXT
);
";
