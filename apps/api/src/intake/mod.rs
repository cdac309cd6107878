//! Intake collector: turns express or detailed role input into one
//! normalized intake record, the sole input to content generation.

pub mod handlers;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    Express,
    Detailed,
}

/// Normalized role description. Express intake fills only the title and
/// seniority; the detailed form fills everything the user provided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub title: String,
    pub seniority: Option<String>,
    pub mission: Option<String>,
    pub responsibilities: Vec<String>,
    pub outcomes: Vec<String>,
    pub competencies: Vec<String>,
    pub source: IntakeSource,
}

impl IntakeRecord {
    pub fn express(title: &str, seniority: Option<&str>) -> Result<Self, AppError> {
        Ok(IntakeRecord {
            title: normalize_title(title)?,
            seniority: normalize_optional(seniority),
            mission: None,
            responsibilities: Vec::new(),
            outcomes: Vec::new(),
            competencies: Vec::new(),
            source: IntakeSource::Express,
        })
    }

    pub fn detailed(
        title: &str,
        mission: Option<&str>,
        seniority: Option<&str>,
        responsibilities: Vec<String>,
        outcomes: Vec<String>,
        competencies: Vec<String>,
    ) -> Result<Self, AppError> {
        Ok(IntakeRecord {
            title: normalize_title(title)?,
            seniority: normalize_optional(seniority),
            mission: normalize_optional(mission),
            responsibilities: normalize_lines(responsibilities),
            outcomes: normalize_lines(outcomes),
            competencies: normalize_lines(competencies),
            source: IntakeSource::Detailed,
        })
    }
}

fn normalize_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Trims entries and drops empties; order is preserved.
fn normalize_lines(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_express_intake_normalizes_title() {
        let record = IntakeRecord::express("  Head of Sales  ", Some("senior")).unwrap();
        assert_eq!(record.title, "Head of Sales");
        assert_eq!(record.seniority.as_deref(), Some("senior"));
        assert_eq!(record.source, IntakeSource::Express);
        assert!(record.responsibilities.is_empty());
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(matches!(
            IntakeRecord::express("   ", None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_detailed_intake_drops_empty_lines() {
        let record = IntakeRecord::detailed(
            "Product Manager",
            Some(" Ship the roadmap "),
            None,
            vec![
                "Own discovery".to_string(),
                "   ".to_string(),
                " Run planning ".to_string(),
            ],
            vec![],
            vec!["prioritization".to_string()],
        )
        .unwrap();

        assert_eq!(record.mission.as_deref(), Some("Ship the roadmap"));
        assert_eq!(
            record.responsibilities,
            vec!["Own discovery".to_string(), "Run planning".to_string()]
        );
        assert_eq!(record.source, IntakeSource::Detailed);
    }

    #[test]
    fn test_blank_optional_fields_become_none() {
        let record = IntakeRecord::detailed("Role", Some("  "), Some(""), vec![], vec![], vec![])
            .unwrap();
        assert!(record.mission.is_none());
        assert!(record.seniority.is_none());
    }
}
