//! Export job store. Jobs are Postgres rows polled by id; the rendering
//! itself runs on a spawned task. A job stuck in `processing` past the
//! stall window is failed at read time rather than by a background reaper.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::export::{ExportJobRow, ExportKind, JobStatus};

/// A job still `processing` after this long is reported failed.
pub const JOB_STALL_MINUTES: i64 = 15;

pub fn is_stalled(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at > Duration::minutes(JOB_STALL_MINUTES)
}

pub async fn insert_job(
    db: &PgPool,
    job_id: Uuid,
    kit_id: Uuid,
    kind: ExportKind,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO export_jobs (id, kit_id, kind, status) VALUES ($1, $2, $3, $4)")
        .bind(job_id)
        .bind(kit_id)
        .bind(kind.as_str())
        .bind(JobStatus::Queued.as_str())
        .execute(db)
        .await?;
    Ok(())
}

/// Moves a job from `queued` to `processing`. False when someone else
/// already claimed it or the job is gone.
pub async fn claim_job(db: &PgPool, job_id: Uuid) -> Result<bool, AppError> {
    let rows = sqlx::query(
        "UPDATE export_jobs SET status = 'processing', updated_at = now() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(job_id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

pub async fn set_progress(db: &PgPool, job_id: Uuid, progress: i32) -> Result<(), AppError> {
    sqlx::query("UPDATE export_jobs SET progress = $1, updated_at = now() WHERE id = $2")
        .bind(progress)
        .bind(job_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn complete_job(db: &PgPool, job_id: Uuid, s3_key: &str) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE export_jobs SET status = $1, s3_key = $2, progress = 100, \
         updated_at = now() WHERE id = $3",
    )
    .bind(JobStatus::Completed.as_str())
    .bind(s3_key)
    .bind(job_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn fail_job(db: &PgPool, job_id: Uuid, error: &str) -> Result<(), AppError> {
    // Error strings can carry upstream bodies; keep the row bounded.
    let error: String = error.chars().take(500).collect();
    sqlx::query(
        "UPDATE export_jobs SET status = $1, error = $2, updated_at = now() WHERE id = $3",
    )
    .bind(JobStatus::Failed.as_str())
    .bind(&error)
    .bind(job_id)
    .execute(db)
    .await?;
    Ok(())
}

/// Fetches a job, expiring it first if it stalled mid-processing.
pub async fn fetch_job(db: &PgPool, job_id: Uuid) -> Result<ExportJobRow, AppError> {
    let job = sqlx::query_as::<_, ExportJobRow>("SELECT * FROM export_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Export job {job_id} not found")))?;

    let status: JobStatus = job
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;

    if status == JobStatus::Processing && is_stalled(job.updated_at, Utc::now()) {
        warn!("Export job {job_id} stalled, marking failed");
        sqlx::query(
            "UPDATE export_jobs SET status = 'failed', error = 'export job timed out', \
             updated_at = now() WHERE id = $1 AND status = 'processing'",
        )
        .bind(job_id)
        .execute(db)
        .await?;
        return fetch_job_row(db, job_id).await;
    }

    Ok(job)
}

async fn fetch_job_row(db: &PgPool, job_id: Uuid) -> Result<ExportJobRow, AppError> {
    sqlx::query_as::<_, ExportJobRow>("SELECT * FROM export_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Export job {job_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_detection_boundary() {
        let now = Utc::now();
        assert!(!is_stalled(now - Duration::minutes(JOB_STALL_MINUTES), now));
        assert!(is_stalled(
            now - Duration::minutes(JOB_STALL_MINUTES) - Duration::seconds(1),
            now
        ));
        assert!(!is_stalled(now, now));
    }
}
