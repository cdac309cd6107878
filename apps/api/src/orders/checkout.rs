//! Checkout creation: one order per session, redirecting to the payment
//! processor's hosted page.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::kit::fetch_kit;
use crate::models::order::{OrderStatus, PlanTier};
use crate::orders::audit::{record, AuditEntry};
use crate::payments::CheckoutParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub kit_id: Uuid,
    pub plan: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub checkout_url: String,
}

/// POST /api/v1/checkout
///
/// The order is inserted as `draft` before the provider call; it only
/// advances to `awaiting_payment` once a session reference exists. A
/// provider failure leaves a retryable draft order behind.
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let plan: PlanTier = request
        .plan
        .parse()
        .map_err(|e: String| AppError::Validation(e))?;
    if request.success_url.trim().is_empty() || request.cancel_url.trim().is_empty() {
        return Err(AppError::Validation(
            "success_url and cancel_url are required".to_string(),
        ));
    }

    let kit = fetch_kit(&state.db, request.kit_id).await?;
    if !kit.documents()?.is_complete() {
        return Err(AppError::Validation(
            "kit content is not fully generated yet".to_string(),
        ));
    }
    let amount_cents = plan.price_cents();
    let order_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO orders (id, kit_id, status, amount_cents, plan) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(order_id)
    .bind(kit.id)
    .bind(OrderStatus::Draft.as_str())
    .bind(amount_cents)
    .bind(plan.as_str())
    .execute(&state.db)
    .await?;

    let product_name = format!("Hiring kit: {}", kit.title);
    let session = state
        .payments
        .create_checkout_session(CheckoutParams {
            order_id,
            kit_id: kit.id,
            product_name: &product_name,
            amount_cents,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
        })
        .await
        .map_err(|e| AppError::Payment(e.to_string()))?;

    sqlx::query(
        "UPDATE orders SET checkout_session_id = $1, status = $2, updated_at = now() \
         WHERE id = $3",
    )
    .bind(&session.id)
    .bind(OrderStatus::AwaitingPayment.as_str())
    .bind(order_id)
    .execute(&state.db)
    .await?;

    info!(
        "Checkout session {} created for order {order_id} ({} plan, {amount_cents} cents)",
        session.id,
        plan.as_str()
    );

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order_id),
            kit_id: Some(kit.id),
            actor: "system:checkout",
            action: "checkout_created",
            detail: json!({
                "order": { "to": OrderStatus::AwaitingPayment.as_str() },
                "plan": plan.as_str(),
                "amount_cents": amount_cents,
                "checkout_session_id": session.id,
            }),
        },
    )
    .await?;

    Ok(Json(CheckoutResponse {
        order_id,
        checkout_url: session.url,
    }))
}
