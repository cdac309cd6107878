//! Axum route handlers for section regeneration.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::generator::default_tone;
use crate::generation::regen::regenerate_section;
use crate::models::content::{SectionContent, SectionKey};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub section: SectionKey,
    pub content: SectionContent,
    pub regen_count: i64,
}

/// POST /api/v1/kits/:id/sections/:section/regenerate
pub async fn handle_regenerate_section(
    State(state): State<AppState>,
    Path((kit_id, section)): Path<(Uuid, String)>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, AppError> {
    let section: SectionKey = section
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;

    let tone = request.tone.unwrap_or_else(default_tone);
    let (content, regen_count) = regenerate_section(&state, kit_id, section, tone).await?;

    Ok(Json(RegenerateResponse {
        section,
        content,
        regen_count,
    }))
}
