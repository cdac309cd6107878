//! Append-only audit trail. Every admin or system action that changes
//! order/kit state records one entry with before/after metadata.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::audit::AuditLogRow;

pub struct AuditEntry<'a> {
    pub order_id: Option<Uuid>,
    pub kit_id: Option<Uuid>,
    pub actor: &'a str,
    pub action: &'a str,
    pub detail: Value,
}

pub async fn record(db: &PgPool, entry: AuditEntry<'_>) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO audit_log (id, order_id, kit_id, actor, action, detail) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(entry.order_id)
    .bind(entry.kit_id)
    .bind(entry.actor)
    .bind(entry.action)
    .bind(&entry.detail)
    .execute(db)
    .await?;
    Ok(())
}

/// Full trail for a kit, oldest first. Includes order-scoped entries that
/// reference the kit.
pub async fn trail_for_kit(db: &PgPool, kit_id: Uuid) -> Result<Vec<AuditLogRow>, AppError> {
    Ok(sqlx::query_as::<_, AuditLogRow>(
        "SELECT * FROM audit_log WHERE kit_id = $1 ORDER BY created_at ASC",
    )
    .bind(kit_id)
    .fetch_all(db)
    .await?)
}
