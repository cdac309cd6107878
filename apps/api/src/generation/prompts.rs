// All LLM prompt constants for hiring-kit section generation.

use crate::errors::AppError;
use crate::generation::generator::SectionRequest;
use crate::models::content::SectionKey;

/// System prompt for section generation. JSON-only output.
pub const GENERATION_SYSTEM: &str =
    "You are an expert talent consultant writing one document of a hiring kit. \
    You MUST respond with valid JSON only: a single object with keys \
    \"heading\" and \"body_md\" (markdown). \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences around the JSON. \
    Ground every statement in the role description; never invent company facts.";

/// Section prompt template.
/// Replace: {section_title}, {section_instruction}, {tone}, {role_json}
const SECTION_PROMPT_TEMPLATE: &str = r#"Write the "{section_title}" document of a hiring kit.

{section_instruction}

TONE: {tone}. Write for a hiring manager who will use this document as-is.

ROLE DESCRIPTION (source of truth):
{role_json}

Return a JSON object:
{
  "heading": "{section_title}",
  "body_md": "... markdown body ..."
}"#;

/// Per-section writing instructions.
fn section_instruction(section: SectionKey) -> &'static str {
    match section {
        SectionKey::Scorecard => {
            "Define the role's mission in one paragraph, then 4-6 measurable \
             outcomes with target timeframes, then the competencies required to \
             reach them. Outcomes must be observable, not traits."
        }
        SectionKey::JobPost => {
            "Write a candidate-facing job post: a compelling opening, what the \
             hire will own, what success looks like in year one, and how to \
             apply. No internal jargon, no laundry lists."
        }
        SectionKey::InterviewStage1 => {
            "Write a 30-minute screening interview guide: goals of the stage, \
             5-7 questions tied to the scorecard outcomes, and what a strong \
             versus weak answer sounds like for each."
        }
        SectionKey::InterviewStage2 => {
            "Write a focused interview guide probing the top three competencies \
             in depth: for each, 2-3 behavioral questions with follow-up probes \
             and scoring guidance on a 1-4 scale."
        }
        SectionKey::InterviewStage3 => {
            "Write a deep-dive interview guide for the final round: career \
             walk-through structure, motivation and trajectory questions, and \
             calibration notes for the debrief."
        }
        SectionKey::WorkSample => {
            "Design a work sample exercise that simulates a real week-one task \
             for this role: the brief given to the candidate, time expectations \
             (under 3 hours), evaluation rubric, and anti-cheating notes."
        }
        SectionKey::ReferenceCheck => {
            "Write a reference call script: how to open, 6-8 questions that \
             verify the scorecard outcomes, and how to read hesitation. Include \
             the one question that must always be asked last."
        }
        SectionKey::ProcessMap => {
            "Lay out the end-to-end hiring process as ordered stages with \
             owners, target durations, and exit criteria per stage, from intake \
             to signed offer."
        }
        SectionKey::EeoGuidance => {
            "Summarize equal-opportunity guidance for this hiring process: \
             questions interviewers must never ask, structured-interview \
             practices that reduce bias, and record-keeping obligations. \
             Plain-language guidance, not legal advice."
        }
    }
}

/// Builds the generation prompt for one section request.
pub fn build_section_prompt(request: &SectionRequest) -> Result<String, AppError> {
    let role_json = serde_json::to_string_pretty(&request.intake)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize intake: {e}")))?;

    Ok(SECTION_PROMPT_TEMPLATE
        .replace("{section_title}", request.section.title())
        .replace("{section_instruction}", section_instruction(request.section))
        .replace("{tone}", &request.tone)
        .replace("{role_json}", &role_json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeRecord;

    #[test]
    fn test_every_section_has_an_instruction() {
        for section in SectionKey::ALL {
            assert!(!section_instruction(section).is_empty());
        }
    }

    #[test]
    fn test_prompt_carries_role_and_section() {
        let request = SectionRequest {
            section: SectionKey::Scorecard,
            intake: IntakeRecord::express("Staff Engineer", None).unwrap(),
            tone: "professional".to_string(),
        };
        let prompt = build_section_prompt(&request).unwrap();
        assert!(prompt.contains("Role Scorecard"));
        assert!(prompt.contains("Staff Engineer"));
        assert!(!prompt.contains("{section_instruction}"));
        assert!(!prompt.contains("{role_json}"));
    }
}
