//! Admin review surface: inspect, edit, approve, and order bookkeeping.
//! Every endpoint requires the admin bearer token and appends to the
//! audit trail.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::intake::handlers::SectionView;
use crate::models::audit::AuditLogRow;
use crate::models::content::{SectionContent, SectionKey};
use crate::models::export::{ExportAssetRow, ExportRow};
use crate::models::kit::{fetch_kit, KitRow, KitStatus};
use crate::models::order::{fetch_order, latest_order_for_kit, OrderRow};
use crate::orders::audit::{record, trail_for_kit, AuditEntry};
use crate::orders::state_machine;
use crate::state::AppState;

pub const ADMIN_ACTOR: &str = "admin";

/// Bearer-token gate for the admin surface. Session handling proper lives
/// outside this service.
fn require_admin(headers: &HeaderMap, config: &Config) -> Result<(), AppError> {
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == config.admin_token)
        .unwrap_or(false);

    if authorized {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inspection
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AdminKitResponse {
    pub kit: KitRow,
    pub order: Option<OrderRow>,
    pub sections: Vec<SectionView>,
    pub exports: Vec<ExportView>,
    pub audit_trail: Vec<AuditLogRow>,
}

#[derive(Debug, Serialize)]
pub struct ExportView {
    #[serde(flatten)]
    pub export: ExportRow,
    pub assets: Vec<ExportAssetRow>,
}

/// GET /api/v1/admin/kits/:id
pub async fn handle_admin_get_kit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kit_id): Path<Uuid>,
) -> Result<Json<AdminKitResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    let kit = fetch_kit(&state.db, kit_id).await?;
    let order = latest_order_for_kit(&state.db, kit_id).await?;
    let docs = kit.documents()?;
    let sections = docs
        .effective_all()
        .into_iter()
        .map(|(section, content)| SectionView {
            section,
            content: content.clone(),
            edited: docs.edited.contains_key(&section),
        })
        .collect();
    let exports = exports_for_kit(&state, kit_id).await?;
    let audit_trail = trail_for_kit(&state.db, kit_id).await?;

    Ok(Json(AdminKitResponse {
        kit,
        order,
        sections,
        exports,
        audit_trail,
    }))
}

/// Past exports with their per-section assets, newest first.
async fn exports_for_kit(state: &AppState, kit_id: Uuid) -> Result<Vec<ExportView>, AppError> {
    let rows: Vec<ExportRow> = sqlx::query_as(
        "SELECT * FROM exports WHERE kit_id = $1 ORDER BY created_at DESC LIMIT 20",
    )
    .bind(kit_id)
    .fetch_all(&state.db)
    .await?;

    let mut views = Vec::with_capacity(rows.len());
    for export in rows {
        let assets: Vec<ExportAssetRow> = sqlx::query_as(
            "SELECT * FROM export_assets WHERE export_id = $1 ORDER BY s3_key ASC",
        )
        .bind(export.id)
        .fetch_all(&state.db)
        .await?;
        views.push(ExportView { export, assets });
    }
    Ok(views)
}

// ────────────────────────────────────────────────────────────────────────────
// Section editing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EditSectionRequest {
    pub heading: String,
    pub body_md: String,
}

#[derive(Debug, Serialize)]
pub struct EditSectionResponse {
    pub section: SectionKey,
    pub content: SectionContent,
    pub kit_status: String,
}

/// PATCH /api/v1/admin/kits/:id/sections/:section
///
/// Writes the edited overlay for one section. A published kit drops back
/// to `editing` so the change goes through approval again.
pub async fn handle_admin_edit_section(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kit_id, section)): Path<(Uuid, String)>,
    Json(request): Json<EditSectionRequest>,
) -> Result<Json<EditSectionResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    let section: SectionKey = section
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;
    if request.body_md.trim().is_empty() {
        return Err(AppError::Validation("body_md cannot be empty".to_string()));
    }

    let kit = fetch_kit(&state.db, kit_id).await?;
    let docs = kit.documents()?;
    let before = docs.effective(section).cloned();

    let content = SectionContent {
        heading: request.heading.trim().to_string(),
        body_md: request.body_md,
    };

    let mut edited = docs.edited;
    edited.insert(section, content.clone());
    let edited_value = serde_json::to_value(&edited)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize edited content: {e}")))?;

    let new_status = if kit.status()? == KitStatus::Published {
        KitStatus::Editing
    } else {
        kit.status()?
    };

    sqlx::query(
        "UPDATE kits SET content_edited = $1, status = $2, updated_at = now() WHERE id = $3",
    )
    .bind(&edited_value)
    .bind(new_status.as_str())
    .bind(kit_id)
    .execute(&state.db)
    .await?;

    info!("Admin edited section {section} of kit {kit_id}");

    record(
        &state.db,
        AuditEntry {
            order_id: None,
            kit_id: Some(kit_id),
            actor: ADMIN_ACTOR,
            action: "section_edited",
            detail: json!({
                "section": section.as_str(),
                "before": before,
                "after": &content,
                "kit": { "from": kit.status, "to": new_status.as_str() },
            }),
        },
    )
    .await?;

    Ok(Json(EditSectionResponse {
        section,
        content,
        kit_status: new_status.as_str().to_string(),
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle actions
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct KitStateResponse {
    pub kit_id: Uuid,
    pub kit_status: String,
    pub order_id: Uuid,
    pub order_status: String,
}

/// POST /api/v1/admin/kits/:id/approve
pub async fn handle_admin_approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kit_id): Path<Uuid>,
) -> Result<Json<KitStateResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    state_machine::approve_kit(&state, kit_id, ADMIN_ACTOR).await?;

    let kit = fetch_kit(&state.db, kit_id).await?;
    let order = latest_order_for_kit(&state.db, kit_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kit {kit_id} has no order")))?;

    Ok(Json(KitStateResponse {
        kit_id,
        kit_status: kit.status,
        order_id: order.id,
        order_status: order.status,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrderStateResponse {
    pub order_id: Uuid,
    pub order_status: String,
}

/// POST /api/v1/admin/orders/:id/mark-paid
pub async fn handle_admin_mark_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStateResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    state_machine::mark_paid(&state, order_id, ADMIN_ACTOR).await?;
    let order = fetch_order(&state.db, order_id).await?;

    Ok(Json(OrderStateResponse {
        order_id,
        order_status: order.status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub note: String,
}

/// POST /api/v1/admin/orders/:id/notes
///
/// Appends a QA note to the order's kit.
pub async fn handle_admin_add_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(request): Json<AddNoteRequest>,
) -> Result<Json<OrderStateResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    let note = request.note.trim();
    if note.is_empty() {
        return Err(AppError::Validation("note cannot be empty".to_string()));
    }

    let order = fetch_order(&state.db, order_id).await?;

    sqlx::query(
        "UPDATE kits SET qa_notes = CASE WHEN qa_notes IS NULL THEN $1 \
         ELSE qa_notes || E'\n' || $1 END, updated_at = now() WHERE id = $2",
    )
    .bind(note)
    .bind(order.kit_id)
    .execute(&state.db)
    .await?;

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order_id),
            kit_id: Some(order.kit_id),
            actor: ADMIN_ACTOR,
            action: "note_added",
            detail: json!({ "note": note }),
        },
    )
    .await?;

    Ok(Json(OrderStateResponse {
        order_id,
        order_status: order.status,
    }))
}

/// POST /api/v1/admin/orders/:id/resend-email
pub async fn handle_admin_resend_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderStateResponse>, AppError> {
    require_admin(&headers, &state.config)?;

    let order = fetch_order(&state.db, order_id).await?;
    let to = order.customer_email.as_deref().ok_or_else(|| {
        AppError::Validation("order has no customer email on file".to_string())
    })?;
    let kit = fetch_kit(&state.db, order.kit_id).await?;

    state
        .mailer
        .send_payment_confirmation(to, &kit.title)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("confirmation resend failed: {e}")))?;

    info!("Resent confirmation for order {order_id} to {to}");

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order_id),
            kit_id: Some(order.kit_id),
            actor: ADMIN_ACTOR,
            action: "confirmation_resent",
            detail: json!({ "to": to }),
        },
    )
    .await?;

    Ok(Json(OrderStateResponse {
        order_id,
        order_status: order.status.clone(),
    }))
}
