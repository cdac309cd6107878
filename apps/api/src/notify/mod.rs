//! Notification dispatcher: a thin client for the transactional email API.
//!
//! Email delivery is best-effort. Callers log failures and carry on; a
//! notification must never fail the state transition that triggered it.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const EMAIL_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: String,
    from: String,
}

impl EmailClient {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            from,
        }
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), EmailError> {
        let body = SendRequest {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post(EMAIL_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Sent '{subject}' to {to}");
        Ok(())
    }

    /// Order confirmation, sent when payment succeeds and on admin resend.
    pub async fn send_payment_confirmation(
        &self,
        to: &str,
        kit_title: &str,
    ) -> Result<(), EmailError> {
        let subject = format!("Your hiring kit \"{kit_title}\" is on its way");
        let html = format!(
            "<p>Thanks for your order.</p>\
             <p>Your hiring kit <strong>{kit_title}</strong> is being prepared. \
             You will receive a follow-up email as soon as it is ready to download.</p>"
        );
        self.send(to, &subject, &html).await
    }

    /// Sent when an admin approves a premium kit for release.
    pub async fn send_approval_notice(&self, to: &str, kit_title: &str) -> Result<(), EmailError> {
        let subject = format!("Your hiring kit \"{kit_title}\" is ready");
        let html = format!(
            "<p>Good news: our review of <strong>{kit_title}</strong> is complete.</p>\
             <p>Sign in to download your kit as a PDF or a per-document archive.</p>"
        );
        self.send(to, &subject, &html).await
    }
}
