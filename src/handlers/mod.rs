pub mod health;
pub mod import;
pub mod schedule_version;
