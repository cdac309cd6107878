use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// One combined PDF with a cover page and all nine sections.
    Combined,
    /// A ZIP archive with one PDF per section.
    Archive,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Combined => "combined",
            ExportKind::Archive => "archive",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportKind::Combined => "pdf",
            ExportKind::Archive => "zip",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combined" => Ok(ExportKind::Combined),
            "archive" => Ok(ExportKind::Archive),
            other => Err(format!("unknown export kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// A completed export artifact. Rows are immutable; freshness is judged
/// against `created_at` at lookup time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExportRow {
    pub id: Uuid,
    pub kit_id: Uuid,
    pub kind: String,
    pub s3_key: String,
    pub created_at: DateTime<Utc>,
}

/// One per-section asset of an archive export.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExportAssetRow {
    pub id: Uuid,
    pub export_id: Uuid,
    pub section: String,
    pub s3_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExportJobRow {
    pub id: Uuid,
    pub kit_id: Uuid,
    pub kind: String,
    pub status: String,
    pub s3_key: Option<String>,
    pub error: Option<String>,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
