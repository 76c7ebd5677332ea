use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::PipelineError;
use crate::orchestrator::{run_import, ImportRequest};
use crate::validation::ValidationResult;
use crate::AppState;

/// Wire request body for `POST /api/v1/import`. `ods_base64` carries the
/// ODS file bytes since the response envelope is JSON-only; a multipart
/// upload is a reasonable alternative but out of scope for this minimal,
/// unauthenticated handler (auth/role enforcement is expected to live in
/// front of this service, not inside it).
#[derive(Debug, Deserialize)]
pub struct ImportRequestBody {
    pub hospital_id: Uuid,
    pub ods_base64: String,
    pub amion_base_url: String,
    /// `YYYY-MM`.
    pub start_month: String,
    pub month_count: usize,
    pub effective_start: DateTime<Utc>,
    pub effective_end: DateTime<Utc>,
    pub acting_user: Uuid,
}

fn parse_start_month(raw: &str) -> Option<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()?;
    Some((date.format("%Y").to_string().parse().ok()?, date.format("%m").to_string().parse().ok()?))
}

#[derive(serde::Serialize)]
pub struct ImportResponseBody {
    pub schedule_version_id: Uuid,
    pub scrape_batch_id: Option<Uuid>,
    pub scrape_batch_state: Option<String>,
    pub coverage_by_position: std::collections::BTreeMap<String, u64>,
    pub query_count: Option<u32>,
}

/// Runs the three-phase import pipeline end to end and renders the result
/// (or failure) as the public response envelope. Only a Phase 1 failure
/// maps to HTTP 400; everything else that reaches this handler
/// successfully returns HTTP 200 with `validation` carrying whatever Phase
/// 2/3 degraded.
pub async fn import(
    State(state): State<AppState>,
    Json(body): Json<ImportRequestBody>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let Some(start_month) = parse_start_month(&body.start_month) else {
        let mut validation = ValidationResult::new();
        validation.add_error("start_month", format!("'{}' is not a YYYY-MM month", body.start_month));
        return (
            StatusCode::BAD_REQUEST,
            Json(Envelope::<()>::validation_failed(validation, request_id)),
        )
            .into_response();
    };

    let ods_bytes = match base64::engine::general_purpose::STANDARD.decode(&body.ods_base64) {
        Ok(bytes) => bytes,
        Err(e) => {
            let mut validation = ValidationResult::new();
            validation.add_error("ods_base64", format!("not valid base64: {e}"));
            return (
                StatusCode::BAD_REQUEST,
                Json(Envelope::<()>::validation_failed(validation, request_id)),
            )
                .into_response();
        }
    };

    let request = ImportRequest {
        hospital_id: body.hospital_id,
        ods_bytes,
        amion_base_url: body.amion_base_url,
        start_month,
        month_count: body.month_count.max(1),
        effective_start: body.effective_start,
        effective_end: body.effective_end,
        acting_user: body.acting_user,
    };

    let token = CancellationToken::new();
    match run_import(state.repo.as_ref(), &state.config, request, &token).await {
        Ok(result) => {
            if !result.validation.is_valid() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(Envelope::<()>::validation_failed(result.validation, request_id)),
                )
                    .into_response();
            }
            let response_body = ImportResponseBody {
                schedule_version_id: result.schedule_version.id,
                scrape_batch_id: result.scrape_batch.as_ref().map(|b| b.id),
                scrape_batch_state: result.scrape_batch.as_ref().map(|b| b.state.as_str().to_string()),
                coverage_by_position: result
                    .coverage
                    .as_ref()
                    .map(|c| c.coverage_by_position.clone())
                    .unwrap_or_default(),
                query_count: result.coverage.as_ref().map(|c| c.query_count),
            };
            (
                StatusCode::OK,
                Json(Envelope::ok(response_body, result.validation, request_id)),
            )
                .into_response()
        }
        Err(e @ PipelineError::NotAZip)
        | Err(e @ PipelineError::TooLarge { .. })
        | Err(e @ PipelineError::MissingContentPart) => {
            let mut validation = ValidationResult::new();
            validation.add_error("", e.to_string());
            (
                StatusCode::BAD_REQUEST,
                Json(Envelope::<()>::validation_failed(validation, request_id)),
            )
                .into_response()
        }
        Err(e @ PipelineError::Cancelled) => (
            StatusCode::BAD_REQUEST,
            Json(Envelope::<()>::fatal(e.code(), e.to_string(), request_id)),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "import pipeline failed with an internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::<()>::fatal(e.code(), e.to_string(), request_id)),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_dash_month() {
        assert_eq!(parse_start_month("2025-11"), Some((2025, 11)));
        assert_eq!(parse_start_month("not-a-month"), None);
    }
}
