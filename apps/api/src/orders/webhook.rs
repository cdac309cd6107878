//! Payment webhook endpoint.
//!
//! Responses: 200 for processed events and duplicates (including
//! still-processing redeliveries), 400 for bad signatures or payloads,
//! 500 when processing fails (the processor will redeliver).
//!
//! Idempotency: the external event id is claimed with a conditional insert
//! before any mutation. A completed id is a success no-op; an id currently
//! mid-flight answers "still processing" without touching the order; a
//! failed id is reclaimed and retried.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::models::webhook::{
    WebhookEventRow, EVENT_STATUS_COMPLETED, EVENT_STATUS_FAILED, EVENT_STATUS_PROCESSING,
};
use crate::orders::state_machine::{apply_payment_failed, apply_payment_succeeded};
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const EVENT_ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";

// ────────────────────────────────────────────────────────────────────────────
// Event payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEventData {
    pub object: CheckoutSessionObject,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub payment_status: Option<String>,
    pub customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl CheckoutSessionObject {
    fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handler
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/webhooks/payments
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("missing webhook signature".to_string()))?;

    let valid = state
        .payments
        .verify_webhook_signature(&body, signature)
        .map_err(|e| AppError::Validation(format!("malformed webhook signature: {e}")))?;
    if !valid {
        warn!("Rejected webhook with invalid signature");
        return Err(AppError::Validation("invalid webhook signature".to_string()));
    }

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {e}")))?;

    // Claim the event id before acting on it.
    let claimed = sqlx::query(
        "INSERT INTO webhook_events (id, event_type, status) VALUES ($1, $2, 'processing') \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(&event.id)
    .bind(&event.event_type)
    .execute(&state.db)
    .await?
    .rows_affected()
        == 1;

    if !claimed {
        let existing: Option<WebhookEventRow> =
            sqlx::query_as("SELECT * FROM webhook_events WHERE id = $1")
                .bind(&event.id)
                .fetch_optional(&state.db)
                .await?;

        match existing.as_ref().map(|row| row.status.as_str()) {
            Some(EVENT_STATUS_COMPLETED) => {
                info!("Duplicate delivery of completed event {}", event.id);
                return Ok(Json(json!({ "received": true, "duplicate": true })));
            }
            Some(EVENT_STATUS_FAILED) => {
                // Reclaim so the redelivery retries the work. If another
                // handler got there first, fall through to still-processing.
                let reclaimed = sqlx::query(
                    "UPDATE webhook_events SET status = 'processing', updated_at = now() \
                     WHERE id = $1 AND status = 'failed'",
                )
                .bind(&event.id)
                .execute(&state.db)
                .await?
                .rows_affected()
                    == 1;
                if !reclaimed {
                    return Ok(Json(json!({ "received": true, "status": "processing" })));
                }
                info!("Retrying previously failed event {}", event.id);
            }
            Some(EVENT_STATUS_PROCESSING) => {
                info!("Event {} is mid-flight, not reprocessing", event.id);
                return Ok(Json(json!({ "received": true, "status": "processing" })));
            }
            _ => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "webhook event {} vanished after conflict",
                    event.id
                )));
            }
        }
    }

    match dispatch_event(&state, &event).await {
        Ok(()) => {
            sqlx::query(
                "UPDATE webhook_events SET status = 'completed', updated_at = now() WHERE id = $1",
            )
            .bind(&event.id)
            .execute(&state.db)
            .await?;
            Ok(Json(json!({ "received": true })))
        }
        Err(e) => {
            error!("Processing event {} ({}) failed: {e}", event.id, event.event_type);
            let mark = sqlx::query(
                "UPDATE webhook_events SET status = 'failed', \
                 metadata = jsonb_set(metadata, '{error}', to_jsonb($2::text)), \
                 updated_at = now() WHERE id = $1",
            )
            .bind(&event.id)
            .bind(e.to_string())
            .execute(&state.db)
            .await;
            if let Err(mark_err) = mark {
                error!("Could not mark event {} failed: {mark_err}", event.id);
            }
            // Processing failures are a 500 regardless of inner error type,
            // so the processor redelivers the event.
            Err(AppError::Internal(anyhow::anyhow!(
                "processing webhook event {} failed: {e}",
                event.id
            )))
        }
    }
}

/// Routes one verified, claimed event to the state machine.
async fn dispatch_event(state: &AppState, event: &PaymentEvent) -> Result<(), AppError> {
    let session = &event.data.object;

    match event.event_type.as_str() {
        EVENT_CHECKOUT_COMPLETED => {
            // Delayed payment methods complete the session before the money
            // clears; the async_payment_succeeded event finishes those.
            if session.payment_status.as_deref() == Some("paid") {
                apply_payment_succeeded(state, &session.id, session.customer_email()).await
            } else {
                info!(
                    "Session {} completed with payment_status {:?}, awaiting async outcome",
                    session.id, session.payment_status
                );
                Ok(())
            }
        }
        EVENT_ASYNC_PAYMENT_SUCCEEDED => {
            apply_payment_succeeded(state, &session.id, session.customer_email()).await
        }
        EVENT_ASYNC_PAYMENT_FAILED => apply_payment_failed(state, &session.id).await,
        other => {
            info!("Ignoring webhook event type '{other}'");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_parses() {
        let payload = json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_123",
                    "payment_status": "paid",
                    "customer_details": { "email": "buyer@example.com" }
                }
            }
        });
        let event: PaymentEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, EVENT_CHECKOUT_COMPLETED);
        assert_eq!(event.data.object.id, "cs_test_123");
        assert_eq!(
            event.data.object.customer_email(),
            Some("buyer@example.com")
        );
    }

    #[test]
    fn test_event_parses_without_customer_details() {
        let payload = json!({
            "id": "evt_456",
            "type": "checkout.session.async_payment_failed",
            "data": { "object": { "id": "cs_789" } }
        });
        let event: PaymentEvent = serde_json::from_value(payload).unwrap();
        assert!(event.data.object.payment_status.is_none());
        assert!(event.data.object.customer_email().is_none());
    }

    #[test]
    fn test_event_without_id_is_rejected() {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1" } }
        });
        assert!(serde_json::from_value::<PaymentEvent>(payload).is_err());
    }
}
