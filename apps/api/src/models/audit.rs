use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only audit trail entry. One row per admin or system action that
/// changes order/kit state, with before/after metadata in `detail`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub kit_id: Option<Uuid>,
    pub actor: String,
    pub action: String,
    pub detail: Value,
    pub created_at: DateTime<Utc>,
}
