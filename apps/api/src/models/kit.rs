use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::content::{KitDocuments, SectionContent, SectionKey};

/// Kit lifecycle status. Loosely coupled to the order status: the order
/// state machine moves a kit into `editing` (premium payment) and
/// `published` (admin approval).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitStatus {
    Draft,
    Generating,
    Generated,
    Editing,
    Published,
}

impl KitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitStatus::Draft => "draft",
            KitStatus::Generating => "generating",
            KitStatus::Generated => "generated",
            KitStatus::Editing => "editing",
            KitStatus::Published => "published",
        }
    }
}

impl fmt::Display for KitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(KitStatus::Draft),
            "generating" => Ok(KitStatus::Generating),
            "generated" => Ok(KitStatus::Generated),
            "editing" => Ok(KitStatus::Editing),
            "published" => Ok(KitStatus::Published),
            other => Err(format!("unknown kit status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KitRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
    pub intake: Value,
    pub content_generated: Option<Value>,
    pub content_edited: Value,
    pub regen_counts: Value,
    pub requires_review: bool,
    pub qa_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KitRow {
    pub fn status(&self) -> Result<KitStatus, AppError> {
        self.status
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
    }

    /// Assembles the document overlay from the two jsonb columns.
    pub fn documents(&self) -> Result<KitDocuments, AppError> {
        let generated: BTreeMap<SectionKey, SectionContent> = match &self.content_generated {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt content_generated: {e}")))?,
            None => BTreeMap::new(),
        };
        let edited: BTreeMap<SectionKey, SectionContent> =
            serde_json::from_value(self.content_edited.clone())
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt content_edited: {e}")))?;
        Ok(KitDocuments { generated, edited })
    }

    /// Per-section regeneration counters. Missing sections count as zero.
    pub fn regen_counts(&self) -> Result<BTreeMap<SectionKey, i64>, AppError> {
        serde_json::from_value(self.regen_counts.clone())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt regen_counts: {e}")))
    }
}

pub async fn fetch_kit(db: &sqlx::PgPool, id: Uuid) -> Result<KitRow, AppError> {
    sqlx::query_as::<_, KitRow>("SELECT * FROM kits WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kit {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kit_status_round_trips() {
        for status in [
            KitStatus::Draft,
            KitStatus::Generating,
            KitStatus::Generated,
            KitStatus::Editing,
            KitStatus::Published,
        ] {
            assert_eq!(status.as_str().parse::<KitStatus>().unwrap(), status);
        }
        assert!("archived".parse::<KitStatus>().is_err());
    }
}
