//! PDF renderer client. Rendering is an external collaborator: we send a
//! titled markdown document to the rendering service and get PDF bytes
//! back. Typography and pagination are its problem, not ours.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    title: &'a str,
    body_markdown: &'a str,
}

#[derive(Clone)]
pub struct RendererClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RendererClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            base_url,
            api_key,
        }
    }

    /// Renders one markdown document to PDF bytes.
    pub async fn render_pdf(&self, title: &str, body_markdown: &str) -> Result<Bytes, RenderError> {
        let url = format!("{}/v1/pdf", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&RenderRequest {
                title,
                body_markdown,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RenderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        debug!("Rendered '{title}' ({} bytes)", bytes.len());
        Ok(bytes)
    }
}
