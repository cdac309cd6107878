use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::export::renderer::RendererClient;
use crate::generation::generator::SectionGenerator;
use crate::notify::EmailClient;
use crate::payments::PaymentsClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub payments: PaymentsClient,
    pub renderer: RendererClient,
    pub mailer: EmailClient,
    /// Pluggable content-generation backend; LLM-backed by default. The LLM
    /// client lives behind this seam, so nothing else calls the LLM API.
    pub generator: Arc<dyn SectionGenerator>,
    pub config: Config,
}
