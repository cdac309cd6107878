//! Payment processor client: hosted-checkout session creation and webhook
//! signature verification.
//!
//! The processor signs webhook payloads with HMAC-SHA256 over
//! `"{timestamp}.{payload}"` and sends the result as `t=<ts>,v1=<hex>`.
//! Signatures older than the tolerance window are rejected to block replays.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";
/// Maximum age of a signed webhook timestamp, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed signature header: {0}")]
    MalformedSignature(String),
}

/// A created hosted-checkout session: the external reference we persist on
/// the order, and the URL the customer is redirected to.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutParams<'a> {
    pub order_id: Uuid,
    pub kit_id: Uuid,
    pub product_name: &'a str,
    pub amount_cents: i64,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct PaymentsClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl PaymentsClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            secret_key,
            webhook_secret,
        }
    }

    /// Creates a hosted-checkout session for one kit/plan pair.
    pub async fn create_checkout_session(
        &self,
        params: CheckoutParams<'_>,
    ) -> Result<CheckoutSession, PaymentError> {
        let amount = params.amount_cents.to_string();
        let order_id = params.order_id.to_string();
        let kit_id = params.kit_id.to_string();

        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][unit_amount]", &amount),
            (
                "line_items[0][price_data][product_data][name]",
                params.product_name,
            ),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            ("metadata[order_id]", &order_id),
            ("metadata[kit_id]", &kit_id),
        ];

        let response = self
            .client
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response.json().await?;
        debug!("Created checkout session {}", session.id);
        Ok(session)
    }

    /// Verifies the `t=<ts>,v1=<hex>` signature header against the raw
    /// payload. Returns Ok(false) for a wrong signature or a stale
    /// timestamp; Err only when the header itself is malformed.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<bool, PaymentError> {
        let parts: HashMap<&str, &str> = signature_header
            .split(',')
            .filter_map(|p| p.split_once('='))
            .collect();

        let timestamp = parts
            .get("t")
            .ok_or_else(|| PaymentError::MalformedSignature("missing timestamp".to_string()))?;
        let signature = parts
            .get("v1")
            .ok_or_else(|| PaymentError::MalformedSignature("missing v1 signature".to_string()))?;

        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| PaymentError::MalformedSignature("non-numeric timestamp".to_string()))?;

        let age = chrono::Utc::now().timestamp() - timestamp;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            return Ok(false);
        }

        let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(signed_payload.as_bytes());

        let Ok(expected) = hex::decode(signature) else {
            return Ok(false);
        };
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> PaymentsClient {
        PaymentsClient::new(
            "sk_test_xxx".to_string(),
            "whsec_test123secret456".to_string(),
        )
    }

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let signed = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let client = test_client();
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let header = sign(payload, "whsec_test123secret456", chrono::Utc::now().timestamp());

        assert!(client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let client = test_client();
        let payload = b"{\"type\":\"checkout.session.completed\"}";
        let header = sign(payload, "wrong_secret", chrono::Utc::now().timestamp());

        assert!(!client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_modified_payload_rejected() {
        let client = test_client();
        let original = b"{\"type\":\"checkout.session.completed\"}";
        let modified = b"{\"type\":\"checkout.session.completed\",\"hacked\":true}";
        let header = sign(
            original,
            "whsec_test123secret456",
            chrono::Utc::now().timestamp(),
        );

        assert!(!client.verify_webhook_signature(modified, &header).unwrap());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let client = test_client();
        let payload = b"{}";
        // 10 minutes old: beyond the 5 minute tolerance
        let header = sign(
            payload,
            "whsec_test123secret456",
            chrono::Utc::now().timestamp() - 600,
        );

        assert!(!client.verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let client = test_client();
        assert!(client
            .verify_webhook_signature(b"{}", "v1=deadbeef")
            .is_err());
    }

    #[test]
    fn test_missing_signature_is_malformed() {
        let client = test_client();
        assert!(client
            .verify_webhook_signature(b"{}", "t=1234567890")
            .is_err());
    }

    #[test]
    fn test_garbage_header_is_malformed() {
        let client = test_client();
        assert!(client.verify_webhook_signature(b"{}", "garbage").is_err());
        assert!(client.verify_webhook_signature(b"{}", "").is_err());
    }

    #[test]
    fn test_non_hex_signature_rejected_not_error() {
        let client = test_client();
        let header = format!("t={},v1=not-hex!", chrono::Utc::now().timestamp());
        assert!(!client.verify_webhook_signature(b"{}", &header).unwrap());
    }

    #[test]
    fn test_unicode_payload_verifies() {
        let client = test_client();
        let payload = "{\"customer_name\":\"日本語\"}".as_bytes();
        let header = sign(payload, "whsec_test123secret456", chrono::Utc::now().timestamp());

        assert!(client.verify_webhook_signature(payload, &header).unwrap());
    }
}
