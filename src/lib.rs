pub mod amion;
pub mod assignment_mapper;
pub mod config;
pub mod coverage;
pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod handlers;
pub mod html;
pub mod materializer;
pub mod models;
pub mod ods;
pub mod orchestrator;
pub mod rate_limiter;
pub mod repository;
pub mod schema;
pub mod validation;
pub mod worker_pool;

use std::sync::Arc;

use repository::SqliteRepository;

/// Shared state handed to every Axum handler: the one repository backing
/// this process's database connection, plus the config it was opened with.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<SqliteRepository>,
    pub config: Arc<config::ImportConfig>,
}
