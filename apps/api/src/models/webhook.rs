use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Idempotency record for one externally delivered payment event. The
/// external event id is the primary key; each id is processed at most once
/// to completion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEventRow {
    pub id: String,
    pub event_type: String,
    pub status: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const EVENT_STATUS_PROCESSING: &str = "processing";
pub const EVENT_STATUS_COMPLETED: &str = "completed";
pub const EVENT_STATUS_FAILED: &str = "failed";
