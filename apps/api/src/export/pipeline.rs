//! Export pipeline: cache lookup, bounded synchronous rendering, and the
//! asynchronous fallback for slow or oversized outputs.
//!
//! generate_export(kit, kind):
//!   1. the kit's order must permit delivery (paid / ready / delivered)
//!   2. a fresh export row (< 24h) for (kit, kind) short-circuits, no render
//!   3. cache miss: render synchronously under a timeout; oversized output
//!      or a timeout falls back to 4
//!   4. async path: insert a queued job, spawn the render, return the job id
//!
//! Completing a download either way transitions the order to `delivered`.

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::export::archive::{build_zip, placeholder_pdf, section_file_name, RenderedSection};
use crate::export::jobs::{claim_job, complete_job, fail_job, insert_job, set_progress};
use crate::intake::IntakeRecord;
use crate::models::content::{KitDocuments, SectionKey};
use crate::models::export::{ExportKind, ExportRow};
use crate::models::kit::{fetch_kit, KitRow};
use crate::models::order::OrderRow;
use crate::orders::state_machine::mark_delivered;
use crate::state::AppState;

/// Exports younger than this are served from cache without re-rendering.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;
/// Synchronous responses are capped at this size; bigger goes async.
pub const SYNC_SIZE_LIMIT_BYTES: usize = 8 * 1024 * 1024;
/// Synchronous rendering deadline; exceeding it falls back to the async path.
pub const SYNC_RENDER_TIMEOUT: Duration = Duration::from_secs(20);

pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at < ChronoDuration::hours(FRESHNESS_WINDOW_HOURS)
}

#[derive(Debug)]
pub enum ExportOutcome {
    Ready {
        export_id: Uuid,
        location: String,
        cached: bool,
    },
    Queued {
        job_id: Uuid,
    },
}

pub async fn generate_export(
    state: &AppState,
    kit_id: Uuid,
    kind: ExportKind,
) -> Result<ExportOutcome, AppError> {
    let kit = fetch_kit(&state.db, kit_id).await?;
    let order = deliverable_order(state, kit_id).await?;

    // Step 1: cache check.
    let latest: Option<ExportRow> = sqlx::query_as(
        "SELECT * FROM exports WHERE kit_id = $1 AND kind = $2 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(kit_id)
    .bind(kind.as_str())
    .fetch_optional(&state.db)
    .await?;

    if let Some(export) = latest.filter(|e| is_fresh(e.created_at, Utc::now())) {
        info!("Export cache hit for kit {kit_id} ({kind}): {}", export.s3_key);
        mark_delivered(&state.db, order.id, kit_id).await?;
        return Ok(ExportOutcome::Ready {
            export_id: export.id,
            location: export.s3_key,
            cached: true,
        });
    }

    // Step 2: synchronous render under a deadline.
    match timeout(SYNC_RENDER_TIMEOUT, render_export(state, &kit, kind)).await {
        Err(_elapsed) => {
            warn!("Sync render of kit {kit_id} ({kind}) timed out, going async");
            enqueue(state, kit_id, kind).await
        }
        Ok(Err(e)) => Err(e),
        Ok(Ok(rendered)) if rendered.total_len() > SYNC_SIZE_LIMIT_BYTES => {
            info!(
                "Rendered export of kit {kit_id} is {} bytes, over the sync cap, going async",
                rendered.total_len()
            );
            enqueue(state, kit_id, kind).await
        }
        Ok(Ok(rendered)) => {
            let export_id = Uuid::new_v4();
            let location = persist_export(state, &kit, kind, export_id, rendered).await?;
            mark_delivered(&state.db, order.id, kit_id).await?;
            Ok(ExportOutcome::Ready {
                export_id,
                location,
                cached: false,
            })
        }
    }
}

/// The kit's order, preferring one in a deliverable status over a newer
/// draft checkout.
async fn preferred_order(state: &AppState, kit_id: Uuid) -> Result<Option<OrderRow>, AppError> {
    Ok(sqlx::query_as(
        "SELECT * FROM orders WHERE kit_id = $1 \
         ORDER BY (status IN ('paid', 'ready', 'delivered')) DESC, created_at DESC LIMIT 1",
    )
    .bind(kit_id)
    .fetch_optional(&state.db)
    .await?)
}

/// The kit's order must be in a state that permits delivery.
async fn deliverable_order(state: &AppState, kit_id: Uuid) -> Result<OrderRow, AppError> {
    let order = preferred_order(state, kit_id).await?.ok_or_else(|| {
        AppError::Forbidden("kit has no order; purchase is required to export".to_string())
    })?;
    if !order.status()?.is_deliverable() {
        return Err(AppError::Forbidden(format!(
            "order is '{}'; export requires a paid order",
            order.status
        )));
    }
    Ok(order)
}

// ────────────────────────────────────────────────────────────────────────────
// Rendering
// ────────────────────────────────────────────────────────────────────────────

pub enum RenderedExport {
    Combined(Bytes),
    Archive {
        zip_bytes: Vec<u8>,
        sections: Vec<RenderedSection>,
    },
}

impl RenderedExport {
    pub fn total_len(&self) -> usize {
        match self {
            RenderedExport::Combined(bytes) => bytes.len(),
            RenderedExport::Archive { zip_bytes, .. } => zip_bytes.len(),
        }
    }
}

async fn render_export(
    state: &AppState,
    kit: &KitRow,
    kind: ExportKind,
) -> Result<RenderedExport, AppError> {
    let docs = kit.documents()?;

    match kind {
        ExportKind::Combined => {
            let markdown = combined_markdown(kit, &docs)?;
            let bytes = state
                .renderer
                .render_pdf(&kit.title, &markdown)
                .await
                .map_err(|e| AppError::Render(e.to_string()))?;
            Ok(RenderedExport::Combined(bytes))
        }
        ExportKind::Archive => {
            let mut sections = Vec::with_capacity(SectionKey::ALL.len());
            for section in SectionKey::ALL {
                sections.push(render_section_or_placeholder(state, &docs, section).await);
            }
            let zip_bytes = build_zip(&sections)?;
            Ok(RenderedExport::Archive { zip_bytes, sections })
        }
    }
}

/// A failed or missing section degrades to the deterministic placeholder in
/// the same slot; the archive never shrinks and the caller never sees the
/// error.
async fn render_section_or_placeholder(
    state: &AppState,
    docs: &KitDocuments,
    section: SectionKey,
) -> RenderedSection {
    let Some(content) = docs.effective(section) else {
        warn!("Section {section} has no content, using placeholder");
        return RenderedSection {
            section,
            bytes: placeholder_pdf(section),
            fallback: true,
        };
    };

    match state.renderer.render_pdf(&content.heading, &content.body_md).await {
        Ok(bytes) => RenderedSection {
            section,
            bytes,
            fallback: false,
        },
        Err(e) => {
            warn!("Render of section {section} failed, using placeholder: {e}");
            RenderedSection {
                section,
                bytes: placeholder_pdf(section),
                fallback: true,
            }
        }
    }
}

/// One markdown document: cover page from the intake record, then every
/// effective section in canonical order.
fn combined_markdown(kit: &KitRow, docs: &KitDocuments) -> Result<String, AppError> {
    let intake: IntakeRecord = serde_json::from_value(kit.intake.clone())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt intake: {e}")))?;

    let mut md = format!("# Hiring Kit: {}\n\n", kit.title);
    if let Some(seniority) = &intake.seniority {
        md.push_str(&format!("**Level:** {seniority}\n\n"));
    }
    if let Some(mission) = &intake.mission {
        md.push_str(&format!("**Mission:** {mission}\n\n"));
    }
    md.push_str(&format!(
        "Prepared {}.\n",
        Utc::now().format("%B %e, %Y")
    ));

    for (_, content) in docs.effective_all() {
        md.push_str("\n\\newpage\n\n");
        md.push_str(&format!("# {}\n\n", content.heading));
        md.push_str(&content.body_md);
        md.push('\n');
    }

    Ok(md)
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence
// ────────────────────────────────────────────────────────────────────────────

async fn upload(
    state: &AppState,
    key: &str,
    bytes: Vec<u8>,
    content_type: &str,
) -> Result<(), AppError> {
    state
        .s3
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(key)
        .body(aws_sdk_s3::primitives::ByteStream::from(bytes))
        .content_type(content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("upload of {key} failed: {e}")))?;
    Ok(())
}

/// Uploads the artifact (and per-section assets for archives) and inserts
/// the immutable export row.
async fn persist_export(
    state: &AppState,
    kit: &KitRow,
    kind: ExportKind,
    export_id: Uuid,
    rendered: RenderedExport,
) -> Result<String, AppError> {
    let s3_key = format!(
        "kits/{}/exports/{export_id}.{}",
        kit.id,
        kind.file_extension()
    );

    let assets: Vec<(SectionKey, String, bool)> = match rendered {
        RenderedExport::Combined(bytes) => {
            upload(state, &s3_key, bytes.to_vec(), "application/pdf").await?;
            Vec::new()
        }
        RenderedExport::Archive { zip_bytes, sections } => {
            let mut assets = Vec::with_capacity(sections.len());
            for (index, entry) in sections.iter().enumerate() {
                let asset_key = format!(
                    "kits/{}/exports/{export_id}/{}",
                    kit.id,
                    section_file_name(index, entry.section)
                );
                upload(state, &asset_key, entry.bytes.to_vec(), "application/pdf").await?;
                assets.push((entry.section, asset_key, entry.fallback));
            }
            upload(state, &s3_key, zip_bytes, "application/zip").await?;
            assets
        }
    };

    sqlx::query("INSERT INTO exports (id, kit_id, kind, s3_key) VALUES ($1, $2, $3, $4)")
        .bind(export_id)
        .bind(kit.id)
        .bind(kind.as_str())
        .bind(&s3_key)
        .execute(&state.db)
        .await?;

    for (section, asset_key, fallback) in &assets {
        sqlx::query(
            "INSERT INTO export_assets (id, export_id, section, s3_key) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(export_id)
        .bind(section.as_str())
        .bind(asset_key)
        .execute(&state.db)
        .await?;
        if *fallback {
            info!("Export {export_id} shipped a placeholder for section {section}");
        }
    }

    info!(
        "Export {export_id} for kit {} persisted at {s3_key} (kind={}, assets={})",
        kit.id,
        kind.as_str(),
        assets.len()
    );

    Ok(s3_key)
}

// ────────────────────────────────────────────────────────────────────────────
// Asynchronous path
// ────────────────────────────────────────────────────────────────────────────

async fn enqueue(state: &AppState, kit_id: Uuid, kind: ExportKind) -> Result<ExportOutcome, AppError> {
    let job_id = Uuid::new_v4();
    insert_job(&state.db, job_id, kit_id, kind).await?;

    let task_state = state.clone();
    tokio::spawn(async move {
        run_export_job(task_state, job_id, kit_id, kind).await;
    });

    info!("Queued export job {job_id} for kit {kit_id} ({kind})");
    Ok(ExportOutcome::Queued { job_id })
}

/// Out-of-band rendering. All failures end in a `failed` job row with an
/// error message; nothing here propagates.
async fn run_export_job(state: AppState, job_id: Uuid, kit_id: Uuid, kind: ExportKind) {
    match claim_job(&state.db, job_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Export job {job_id} was already claimed");
            return;
        }
        Err(e) => {
            error!("Claiming export job {job_id} failed: {e}");
            return;
        }
    }

    if let Err(e) = process_job(&state, job_id, kit_id, kind).await {
        error!("Export job {job_id} failed: {e}");
        if let Err(mark_err) = fail_job(&state.db, job_id, &e.to_string()).await {
            error!("Could not mark export job {job_id} failed: {mark_err}");
        }
    }
}

async fn process_job(
    state: &AppState,
    job_id: Uuid,
    kit_id: Uuid,
    kind: ExportKind,
) -> Result<(), AppError> {
    let kit = fetch_kit(&state.db, kit_id).await?;
    set_progress(&state.db, job_id, 10).await?;

    let rendered = render_export(state, &kit, kind).await?;
    set_progress(&state.db, job_id, 70).await?;

    let export_id = Uuid::new_v4();
    let s3_key = persist_export(state, &kit, kind, export_id, rendered).await?;
    complete_job(&state.db, job_id, &s3_key).await?;

    if let Some(order) = preferred_order(state, kit_id).await? {
        mark_delivered(&state.db, order.id, kit_id).await?;
    }

    info!("Export job {job_id} completed: {s3_key}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_window_boundary() {
        let now = Utc::now();
        assert!(is_fresh(now - ChronoDuration::hours(23), now));
        assert!(!is_fresh(now - ChronoDuration::hours(24), now));
        assert!(!is_fresh(now - ChronoDuration::hours(25), now));
    }

    #[test]
    fn test_rendered_export_size_uses_artifact_bytes() {
        let combined = RenderedExport::Combined(Bytes::from(vec![0u8; 128]));
        assert_eq!(combined.total_len(), 128);

        let archive = RenderedExport::Archive {
            zip_bytes: vec![0u8; 64],
            sections: Vec::new(),
        };
        assert_eq!(archive.total_len(), 64);
    }
}
