//! Kit document model: the nine fixed sections and the edited-over-generated
//! overlay. Sections are a closed enum so the archive layout, prompts and
//! regeneration counters all agree on one inventory.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The nine hiring-kit sections, in canonical (archive) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SectionKey {
    #[serde(rename = "scorecard")]
    Scorecard,
    #[serde(rename = "job_post")]
    JobPost,
    #[serde(rename = "interview_stage_1")]
    InterviewStage1,
    #[serde(rename = "interview_stage_2")]
    InterviewStage2,
    #[serde(rename = "interview_stage_3")]
    InterviewStage3,
    #[serde(rename = "work_sample")]
    WorkSample,
    #[serde(rename = "reference_check")]
    ReferenceCheck,
    #[serde(rename = "process_map")]
    ProcessMap,
    #[serde(rename = "eeo_guidance")]
    EeoGuidance,
}

impl SectionKey {
    /// All sections in canonical order. Archive exports emit exactly this set.
    pub const ALL: [SectionKey; 9] = [
        SectionKey::Scorecard,
        SectionKey::JobPost,
        SectionKey::InterviewStage1,
        SectionKey::InterviewStage2,
        SectionKey::InterviewStage3,
        SectionKey::WorkSample,
        SectionKey::ReferenceCheck,
        SectionKey::ProcessMap,
        SectionKey::EeoGuidance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Scorecard => "scorecard",
            SectionKey::JobPost => "job_post",
            SectionKey::InterviewStage1 => "interview_stage_1",
            SectionKey::InterviewStage2 => "interview_stage_2",
            SectionKey::InterviewStage3 => "interview_stage_3",
            SectionKey::WorkSample => "work_sample",
            SectionKey::ReferenceCheck => "reference_check",
            SectionKey::ProcessMap => "process_map",
            SectionKey::EeoGuidance => "eeo_guidance",
        }
    }

    /// Human-readable title used for document headings and placeholders.
    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::Scorecard => "Role Scorecard",
            SectionKey::JobPost => "Job Post",
            SectionKey::InterviewStage1 => "Interview Guide: Stage 1 (Screen)",
            SectionKey::InterviewStage2 => "Interview Guide: Stage 2 (Focused)",
            SectionKey::InterviewStage3 => "Interview Guide: Stage 3 (Deep Dive)",
            SectionKey::WorkSample => "Work Sample Exercise",
            SectionKey::ReferenceCheck => "Reference Check Script",
            SectionKey::ProcessMap => "Hiring Process Map",
            SectionKey::EeoGuidance => "EEO & Compliance Guidance",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown section '{s}'"))
    }
}

/// One section's document content. `body_md` is markdown; the renderer
/// collaborator owns typography and pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionContent {
    pub heading: String,
    pub body_md: String,
}

/// A kit's full document set: the generated baseline plus the partial
/// edited overlay. The overlay wins per section; it never shadows sections
/// it does not contain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KitDocuments {
    pub generated: BTreeMap<SectionKey, SectionContent>,
    pub edited: BTreeMap<SectionKey, SectionContent>,
}

impl KitDocuments {
    /// Effective content for one section: edited if present, else generated.
    pub fn effective(&self, key: SectionKey) -> Option<&SectionContent> {
        self.edited.get(&key).or_else(|| self.generated.get(&key))
    }

    /// Effective content for every section that has any, in canonical order.
    pub fn effective_all(&self) -> Vec<(SectionKey, &SectionContent)> {
        SectionKey::ALL
            .iter()
            .filter_map(|&k| self.effective(k).map(|c| (k, c)))
            .collect()
    }

    /// True when the generated baseline covers every section.
    pub fn is_complete(&self) -> bool {
        SectionKey::ALL.iter().all(|k| self.generated.contains_key(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> SectionContent {
        SectionContent {
            heading: text.to_string(),
            body_md: format!("body of {text}"),
        }
    }

    #[test]
    fn test_section_inventory_is_exactly_nine() {
        assert_eq!(SectionKey::ALL.len(), 9);
    }

    #[test]
    fn test_section_key_round_trips_through_str() {
        for key in SectionKey::ALL {
            assert_eq!(key.as_str().parse::<SectionKey>().unwrap(), key);
        }
        assert!("cover_letter".parse::<SectionKey>().is_err());
    }

    #[test]
    fn test_section_key_serializes_as_snake_case_string() {
        let json = serde_json::to_string(&SectionKey::InterviewStage2).unwrap();
        assert_eq!(json, "\"interview_stage_2\"");
    }

    #[test]
    fn test_edited_section_wins_over_generated() {
        let mut docs = KitDocuments::default();
        docs.generated
            .insert(SectionKey::Scorecard, content("generated"));
        docs.edited.insert(SectionKey::Scorecard, content("edited"));

        assert_eq!(
            docs.effective(SectionKey::Scorecard).unwrap().heading,
            "edited"
        );
    }

    #[test]
    fn test_overlay_does_not_shadow_other_sections() {
        let mut docs = KitDocuments::default();
        docs.generated
            .insert(SectionKey::Scorecard, content("generated scorecard"));
        docs.generated
            .insert(SectionKey::JobPost, content("generated post"));
        docs.edited
            .insert(SectionKey::Scorecard, content("edited scorecard"));

        assert_eq!(
            docs.effective(SectionKey::JobPost).unwrap().heading,
            "generated post"
        );
    }

    #[test]
    fn test_effective_all_preserves_canonical_order() {
        let mut docs = KitDocuments::default();
        for key in SectionKey::ALL {
            docs.generated.insert(key, content(key.as_str()));
        }
        let keys: Vec<SectionKey> = docs.effective_all().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, SectionKey::ALL.to_vec());
    }

    #[test]
    fn test_documents_round_trip_through_json() {
        let mut docs = KitDocuments::default();
        docs.generated
            .insert(SectionKey::EeoGuidance, content("eeo"));
        docs.edited
            .insert(SectionKey::WorkSample, content("sample"));

        let value = serde_json::to_value(&docs).unwrap();
        let recovered: KitDocuments = serde_json::from_value(value).unwrap();
        assert_eq!(
            recovered.effective(SectionKey::WorkSample).unwrap().heading,
            "sample"
        );
    }
}
