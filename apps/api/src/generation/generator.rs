//! Content generation seam. The state machine and export pipeline never
//! call the LLM API; they see only `Arc<dyn SectionGenerator>` in
//! `AppState`, so the backend can be swapped without touching callers.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::generation::prompts::{build_section_prompt, GENERATION_SYSTEM};
use crate::intake::IntakeRecord;
use crate::llm_client::LlmClient;
use crate::models::content::{SectionContent, SectionKey};

/// Retries when the LLM returns an empty or unparseable section.
const MAX_GENERATION_RETRIES: u32 = 2;

/// Everything a backend needs to produce one section.
#[derive(Debug, Clone)]
pub struct SectionRequest {
    pub section: SectionKey,
    pub intake: IntakeRecord,
    /// Style setting carried from the request; defaults to "professional".
    pub tone: String,
}

pub fn default_tone() -> String {
    "professional".to_string()
}

#[async_trait]
pub trait SectionGenerator: Send + Sync {
    async fn generate(&self, request: &SectionRequest) -> Result<SectionContent, AppError>;
}

/// LLM-backed generator: one prompt per section, JSON response.
pub struct LlmSectionGenerator {
    llm: LlmClient,
}

impl LlmSectionGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl SectionGenerator for LlmSectionGenerator {
    async fn generate(&self, request: &SectionRequest) -> Result<SectionContent, AppError> {
        let prompt = build_section_prompt(request)?;

        for attempt in 0..=MAX_GENERATION_RETRIES {
            let result: Result<SectionContent, _> =
                self.llm.complete_json(GENERATION_SYSTEM, &prompt).await;

            match result {
                Ok(content) if !content.body_md.trim().is_empty() => {
                    info!(
                        "Generated section {} for role '{}' ({} chars)",
                        request.section,
                        request.intake.title,
                        content.body_md.len()
                    );
                    return Ok(content);
                }
                Ok(_) => {
                    warn!(
                        "Attempt {}/{}: empty body for section {}, retrying",
                        attempt + 1,
                        MAX_GENERATION_RETRIES + 1,
                        request.section
                    );
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{}: generation failed for section {}: {e}",
                        attempt + 1,
                        MAX_GENERATION_RETRIES + 1,
                        request.section
                    );
                }
            }
        }

        Err(AppError::Llm(format!(
            "Section {} generation failed after {} attempts",
            request.section,
            MAX_GENERATION_RETRIES + 1
        )))
    }
}
