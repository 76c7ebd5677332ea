use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::error::PipelineError;
use crate::orchestrator::{archive_schedule_version, promote_schedule_version};
use crate::validation::ValidationResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TransitionRequestBody {
    pub acting_user: Uuid,
}

#[derive(serde::Serialize)]
pub struct ScheduleVersionResponseBody {
    pub schedule_version_id: Uuid,
    pub status: String,
}

fn render(result: Result<crate::models::ScheduleVersion, PipelineError>, request_id: String) -> Response {
    match result {
        Ok(version) => {
            let body = ScheduleVersionResponseBody {
                schedule_version_id: version.id,
                status: version.status.as_str().to_string(),
            };
            (
                StatusCode::OK,
                Json(Envelope::ok(body, ValidationResult::new(), request_id)),
            )
                .into_response()
        }
        Err(e @ PipelineError::InvalidVersionStateTransition(_)) => {
            let mut validation = ValidationResult::new();
            validation.add_error("", e.to_string());
            (
                StatusCode::BAD_REQUEST,
                Json(Envelope::<()>::validation_failed(validation, request_id)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "schedule version transition failed with an internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Envelope::<()>::fatal(e.code(), e.to_string(), request_id)),
            )
                .into_response()
        }
    }
}

/// Promotes a STAGING `ScheduleVersion` to PRODUCTION. Rejected (HTTP 400)
/// if another version for the same hospital already holds the PRODUCTION
/// slot — see `orchestrator::promote_schedule_version`.
pub async fn promote(
    State(state): State<AppState>,
    Path(schedule_version_id): Path<Uuid>,
    Json(body): Json<TransitionRequestBody>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let result = promote_schedule_version(state.repo.as_ref(), schedule_version_id, body.acting_user);
    render(result, request_id)
}

/// Archives a PRODUCTION `ScheduleVersion`. Rejected (HTTP 400) if it isn't
/// currently PRODUCTION — see `orchestrator::archive_schedule_version`.
pub async fn archive(
    State(state): State<AppState>,
    Path(schedule_version_id): Path<Uuid>,
    Json(body): Json<TransitionRequestBody>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let result = archive_schedule_version(state.repo.as_ref(), schedule_version_id, body.acting_user);
    render(result, request_id)
}
