//! Axum route handlers for kit intake and retrieval.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::generator::{default_tone, SectionRequest};
use crate::intake::IntakeRecord;
use crate::models::content::{SectionContent, SectionKey};
use crate::models::kit::{fetch_kit, KitStatus};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExpressIntakeRequest {
    pub user_id: Uuid,
    pub title: String,
    pub seniority: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetailedIntakeRequest {
    pub user_id: Uuid,
    pub title: String,
    pub mission: Option<String>,
    pub seniority: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<String>,
    #[serde(default)]
    pub competencies: Vec<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KitResponse {
    pub kit_id: Uuid,
    pub title: String,
    pub status: String,
    pub requires_review: bool,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub section: SectionKey,
    pub content: SectionContent,
    pub edited: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/kits/express
pub async fn handle_create_kit_express(
    State(state): State<AppState>,
    Json(request): Json<ExpressIntakeRequest>,
) -> Result<Json<KitResponse>, AppError> {
    let intake = IntakeRecord::express(&request.title, request.seniority.as_deref())?;
    let tone = request.tone.unwrap_or_else(default_tone);
    create_kit(&state, request.user_id, intake, tone).await
}

/// POST /api/v1/kits
pub async fn handle_create_kit(
    State(state): State<AppState>,
    Json(request): Json<DetailedIntakeRequest>,
) -> Result<Json<KitResponse>, AppError> {
    let intake = IntakeRecord::detailed(
        &request.title,
        request.mission.as_deref(),
        request.seniority.as_deref(),
        request.responsibilities,
        request.outcomes,
        request.competencies,
    )?;
    let tone = request.tone.unwrap_or_else(default_tone);
    create_kit(&state, request.user_id, intake, tone).await
}

/// GET /api/v1/kits/:id
pub async fn handle_get_kit(
    State(state): State<AppState>,
    Path(kit_id): Path<Uuid>,
) -> Result<Json<KitResponse>, AppError> {
    let kit = fetch_kit(&state.db, kit_id).await?;
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

    Ok(Json(KitResponse {
        kit_id: kit.id,
        title: kit.title,
        status: kit.status,
        requires_review: kit.requires_review,
        sections,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Creation pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Inserts the kit, runs the first full generation pass, and persists the
/// generated baseline. Generation failure drops the kit back to `draft` so
/// the user can retry without losing the intake.
async fn create_kit(
    state: &AppState,
    user_id: Uuid,
    intake: IntakeRecord,
    tone: String,
) -> Result<Json<KitResponse>, AppError> {
    let kit_id = Uuid::new_v4();
    let intake_value: Value = serde_json::to_value(&intake)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize intake: {e}")))?;

    sqlx::query(
        "INSERT INTO kits (id, user_id, title, status, intake) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(kit_id)
    .bind(user_id)
    .bind(&intake.title)
    .bind(KitStatus::Generating.as_str())
    .bind(&intake_value)
    .execute(&state.db)
    .await?;

    info!("Created kit {kit_id} for user {user_id}, generating content");

    let mut generated: BTreeMap<SectionKey, SectionContent> = BTreeMap::new();
    for section in SectionKey::ALL {
        let request = SectionRequest {
            section,
            intake: intake.clone(),
            tone: tone.clone(),
        };
        match state.generator.generate(&request).await {
            Ok(content) => {
                generated.insert(section, content);
            }
            Err(e) => {
                error!("Generation of section {section} failed for kit {kit_id}: {e}");
                sqlx::query("UPDATE kits SET status = $1, updated_at = now() WHERE id = $2")
                    .bind(KitStatus::Draft.as_str())
                    .bind(kit_id)
                    .execute(&state.db)
                    .await?;
                return Err(e);
            }
        }
    }

    let generated_value = serde_json::to_value(&generated)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize generated content: {e}")))?;

    sqlx::query(
        "UPDATE kits SET content_generated = $1, status = $2, updated_at = now() WHERE id = $3",
    )
    .bind(&generated_value)
    .bind(KitStatus::Generated.as_str())
    .bind(kit_id)
    .execute(&state.db)
    .await?;

    info!("Kit {kit_id} generated ({} sections)", generated.len());

    let sections = SectionKey::ALL
        .iter()
        .filter_map(|&section| {
            generated.get(&section).map(|content| SectionView {
                section,
                content: content.clone(),
                edited: false,
            })
        })
        .collect();

    Ok(Json(KitResponse {
        kit_id,
        title: intake.title,
        status: KitStatus::Generated.as_str().to_string(),
        requires_review: false,
        sections,
    }))
}
