//! Axum route handlers for export requests and job polling.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::export::jobs::fetch_job;
use crate::export::pipeline::{generate_export, ExportOutcome};
use crate::models::export::{ExportKind, JobStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub kind: String,
}

/// POST /api/v1/kits/:id/export
///
/// Returns either an immediate download location (sync render or cache
/// hit) or a job id plus polling URL for the async path.
pub async fn handle_create_export(
    State(state): State<AppState>,
    Path(kit_id): Path<Uuid>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<Value>, AppError> {
    let kind: ExportKind = request
        .kind
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;

    match generate_export(&state, kit_id, kind).await? {
        ExportOutcome::Ready {
            export_id,
            location,
            cached,
        } => Ok(Json(json!({
            "status": "ready",
            "export_id": export_id,
            "location": location,
            "cached": cached,
        }))),
        ExportOutcome::Queued { job_id } => Ok(Json(json!({
            "status": "queued",
            "job_id": job_id,
            "poll_url": format!(
                "{}/api/v1/exports/jobs/{job_id}",
                state.config.public_base_url.trim_end_matches('/')
            ),
        }))),
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/v1/exports/jobs/:id
///
/// The location is exposed only once the job completes; a failed job
/// exposes its error message. No partial content ever leaves this endpoint.
pub async fn handle_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job = fetch_job(&state.db, job_id).await?;
    let status: JobStatus = job
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

    let (location, error) = match status {
        JobStatus::Completed => (job.s3_key, None),
        JobStatus::Failed => (None, job.error),
        JobStatus::Queued | JobStatus::Processing => (None, None),
    };

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        location,
        error,
    }))
}
