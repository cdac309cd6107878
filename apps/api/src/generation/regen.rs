//! Regeneration limiter: unpaid kits may regenerate each section at most
//! three times; a paid order lifts the cap. Counters only ever go up.

use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::generator::SectionRequest;
use crate::intake::IntakeRecord;
use crate::models::content::{SectionContent, SectionKey};
use crate::models::kit::fetch_kit;
use crate::models::order::kit_has_paid_order;
use crate::state::AppState;

pub const UNPAID_REGEN_LIMIT: i64 = 3;

/// Gate check, done before any generation work or mutation.
pub fn check_regen_allowed(has_paid_order: bool, current_count: i64) -> Result<(), AppError> {
    if has_paid_order {
        return Ok(());
    }
    if current_count >= UNPAID_REGEN_LIMIT {
        return Err(AppError::LimitExceeded(format!(
            "Free kits can regenerate each section {UNPAID_REGEN_LIMIT} times. \
             Upgrade to keep editing this section."
        )));
    }
    Ok(())
}

/// Regenerates one section and merges the result into the edited overlay.
/// Returns the new content and the updated counter.
pub async fn regenerate_section(
    state: &AppState,
    kit_id: Uuid,
    section: SectionKey,
    tone: String,
) -> Result<(SectionContent, i64), AppError> {
    let kit = fetch_kit(&state.db, kit_id).await?;

    let counts = kit.regen_counts()?;
    let current = counts.get(&section).copied().unwrap_or(0);
    let paid = kit_has_paid_order(&state.db, kit_id).await?;
    check_regen_allowed(paid, current)?;

    let intake: IntakeRecord = serde_json::from_value(kit.intake.clone())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt intake: {e}")))?;

    let content = state
        .generator
        .generate(&SectionRequest {
            section,
            intake,
            tone,
        })
        .await?;

    // Merge into the overlay and bump the counter; other sections are
    // untouched because the full maps are rewritten from the merged state.
    let docs = kit.documents()?;
    let mut edited = docs.edited;
    edited.insert(section, content.clone());

    let mut counts = counts;
    let new_count = current + 1;
    counts.insert(section, new_count);

    let edited_value = serde_json::to_value(&edited)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize edited content: {e}")))?;
    let counts_value = serde_json::to_value(&counts)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize regen counts: {e}")))?;

    sqlx::query(
        "UPDATE kits SET content_edited = $1, regen_counts = $2, updated_at = now() WHERE id = $3",
    )
    .bind(&edited_value)
    .bind(&counts_value)
    .bind(kit_id)
    .execute(&state.db)
    .await?;

    info!(
        "Regenerated section {section} of kit {kit_id} (count {current} -> {new_count}, paid={paid})"
    );

    Ok((content, new_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpaid_kit_allowed_below_limit() {
        assert!(check_regen_allowed(false, 0).is_ok());
        assert!(check_regen_allowed(false, 2).is_ok());
    }

    #[test]
    fn test_unpaid_kit_blocked_at_limit() {
        // The 4th attempt for a section sees count 3 and must fail.
        assert!(matches!(
            check_regen_allowed(false, UNPAID_REGEN_LIMIT),
            Err(AppError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_limit_error_mentions_upgrade() {
        let err = check_regen_allowed(false, 3).unwrap_err();
        match err {
            AppError::LimitExceeded(msg) => assert!(msg.contains("Upgrade")),
            other => panic!("expected LimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_paid_kit_unlimited() {
        assert!(check_regen_allowed(true, UNPAID_REGEN_LIMIT).is_ok());
        assert!(check_regen_allowed(true, 50).is_ok());
    }
}
