//! Order state machine: the authoritative owner of order and kit status.
//!
//! Every transition is a status-guarded conditional UPDATE: the expected
//! current status is part of the WHERE clause, and zero affected rows is a
//! state conflict, never a silent no-op. Multi-step transitions compensate
//! the first write if the second fails. Each applied transition appends an
//! audit entry.
//!
//! Transition map (order):
//!   checkout created            draft/awaiting_payment
//!   payment succeeded           -> paid (standard) | qa_pending (premium)
//!   payment failed (async)      awaiting_payment -> draft
//!   admin approve               qa_pending -> ready   (kit -> published)
//!   admin mark-paid             awaiting_payment -> paid
//!   download completed          paid | ready -> delivered (terminal)

use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::kit::{fetch_kit, KitStatus};
use crate::models::order::{fetch_order, OrderRow, OrderStatus, PlanTier};
use crate::orders::audit::{record, AuditEntry};
use crate::state::AppState;

pub const WEBHOOK_ACTOR: &str = "system:webhook";
pub const EXPORT_ACTOR: &str = "system:export";

// ────────────────────────────────────────────────────────────────────────────
// Pure transition logic
// ────────────────────────────────────────────────────────────────────────────

/// Target order status for a successful payment, derived from the amount.
/// Premium orders go through QA; the kit enters review at the same time.
pub fn payment_succeeded_target(amount_cents: i64) -> (OrderStatus, PlanTier) {
    match PlanTier::from_amount_cents(amount_cents) {
        PlanTier::Premium => (OrderStatus::QaPending, PlanTier::Premium),
        PlanTier::Standard => (OrderStatus::Paid, PlanTier::Standard),
    }
}

/// Mark-paid is valid only from `awaiting_payment`.
pub fn mark_paid_transition(current: OrderStatus) -> Result<OrderStatus, AppError> {
    if current == OrderStatus::AwaitingPayment {
        Ok(OrderStatus::Paid)
    } else {
        Err(AppError::StateConflict(format!(
            "order is '{current}', mark-paid requires 'awaiting_payment'"
        )))
    }
}

/// Approval requires a kit flagged for review and an order in QA.
pub fn approval_preconditions(
    order_status: OrderStatus,
    requires_review: bool,
) -> Result<(), AppError> {
    if !requires_review {
        return Err(AppError::StateConflict(
            "kit is not flagged for review".to_string(),
        ));
    }
    if order_status != OrderStatus::QaPending {
        return Err(AppError::StateConflict(format!(
            "order is '{order_status}', approval requires 'qa_pending'"
        )));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Payment events
// ────────────────────────────────────────────────────────────────────────────

async fn order_by_session(db: &PgPool, session_id: &str) -> Result<OrderRow, AppError> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE checkout_session_id = $1")
        .bind(session_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No order for checkout session {session_id}")))
}

/// Applies a payment-succeeded event to the order behind a checkout session.
///
/// An order already at or past `paid` is left untouched: a second success
/// signal under a fresh event id is an upstream retry, not a new payment.
pub async fn apply_payment_succeeded(
    state: &AppState,
    session_id: &str,
    customer_email: Option<&str>,
) -> Result<(), AppError> {
    let order = order_by_session(&state.db, session_id).await?;
    let current = order.status()?;

    if current.is_paid() {
        info!(
            "Order {} already '{current}', ignoring repeated payment success",
            order.id
        );
        return Ok(());
    }

    let (target, tier) = payment_succeeded_target(order.amount_cents);
    let kit = fetch_kit(&state.db, order.kit_id).await?;
    let previous_kit_status = kit.status.clone();

    // Premium: flag the kit for review first, then advance the order, and
    // undo the kit write if the order write does not land.
    if tier == PlanTier::Premium {
        sqlx::query(
            "UPDATE kits SET status = $1, requires_review = TRUE, updated_at = now() \
             WHERE id = $2",
        )
        .bind(KitStatus::Editing.as_str())
        .bind(kit.id)
        .execute(&state.db)
        .await?;
    }

    let updated = sqlx::query(
        "UPDATE orders SET status = $1, customer_email = COALESCE($2, customer_email), \
         updated_at = now() WHERE id = $3 AND status IN ('draft', 'awaiting_payment')",
    )
    .bind(target.as_str())
    .bind(customer_email)
    .bind(order.id)
    .execute(&state.db)
    .await;

    let rows = match updated {
        Ok(done) => done.rows_affected(),
        Err(e) => {
            if tier == PlanTier::Premium {
                compensate_kit(&state.db, kit.id, &previous_kit_status, kit.requires_review).await;
            }
            return Err(e.into());
        }
    };
    if rows == 0 {
        if tier == PlanTier::Premium {
            compensate_kit(&state.db, kit.id, &previous_kit_status, kit.requires_review).await;
        }
        return Err(AppError::StateConflict(format!(
            "order {} changed status while processing payment",
            order.id
        )));
    }

    info!(
        "Order {} '{current}' -> '{target}' ({} plan, {} cents)",
        order.id,
        tier.as_str(),
        order.amount_cents
    );

    let kit_target = if tier == PlanTier::Premium {
        KitStatus::Editing.as_str()
    } else {
        previous_kit_status.as_str()
    };
    record(
        &state.db,
        AuditEntry {
            order_id: Some(order.id),
            kit_id: Some(order.kit_id),
            actor: WEBHOOK_ACTOR,
            action: "payment_succeeded",
            detail: json!({
                "order": { "from": current.as_str(), "to": target.as_str() },
                "kit": { "from": previous_kit_status.as_str(), "to": kit_target },
                "amount_cents": order.amount_cents,
                "plan": tier.as_str(),
                "checkout_session_id": session_id,
            }),
        },
    )
    .await?;

    // Confirmation email is best-effort; the transition already happened.
    let email = customer_email
        .map(str::to_string)
        .or(order.customer_email.clone());
    if let Some(to) = email {
        if let Err(e) = state.mailer.send_payment_confirmation(&to, &kit.title).await {
            warn!("Confirmation email for order {} failed: {e}", order.id);
        }
    }

    Ok(())
}

/// Applies an async payment-failed event: the order reverts to `draft` so
/// the customer can retry checkout. Arriving after a success (out-of-order
/// delivery) it finds no payment-pending order and is acknowledged as-is.
pub async fn apply_payment_failed(state: &AppState, session_id: &str) -> Result<(), AppError> {
    let order = order_by_session(&state.db, session_id).await?;
    let current = order.status()?;

    let rows = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = 'awaiting_payment'",
    )
    .bind(OrderStatus::Draft.as_str())
    .bind(order.id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if rows == 0 {
        warn!(
            "Payment-failed event for order {} in status '{current}', ignoring",
            order.id
        );
        return Ok(());
    }

    info!("Order {} '{current}' -> 'draft' after failed payment", order.id);

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order.id),
            kit_id: Some(order.kit_id),
            actor: WEBHOOK_ACTOR,
            action: "payment_failed",
            detail: json!({
                "order": { "from": current.as_str(), "to": OrderStatus::Draft.as_str() },
                "checkout_session_id": session_id,
            }),
        },
    )
    .await?;

    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Admin transitions
// ────────────────────────────────────────────────────────────────────────────

/// Approves a reviewed kit: kit -> published, order -> ready.
///
/// Two writes. If the order write fails after the kit write landed, the kit
/// is reverted so a published kit can never sit behind a non-ready order.
pub async fn approve_kit(state: &AppState, kit_id: Uuid, actor: &str) -> Result<(), AppError> {
    let kit = fetch_kit(&state.db, kit_id).await?;
    // Prefer the order actually sitting in QA; a draft checkout opened after
    // payment must not shadow it.
    let order: OrderRow = sqlx::query_as(
        "SELECT * FROM orders WHERE kit_id = $1 \
         ORDER BY (status = 'qa_pending') DESC, created_at DESC LIMIT 1",
    )
    .bind(kit_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Kit {kit_id} has no order")))?;
    let order_status = order.status()?;

    approval_preconditions(order_status, kit.requires_review)?;

    let previous_kit_status = kit.status.clone();

    let kit_rows = sqlx::query(
        "UPDATE kits SET status = $1, requires_review = FALSE, updated_at = now() \
         WHERE id = $2 AND requires_review = TRUE",
    )
    .bind(KitStatus::Published.as_str())
    .bind(kit_id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if kit_rows == 0 {
        return Err(AppError::StateConflict(
            "kit review state changed while approving".to_string(),
        ));
    }

    let order_update = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = 'qa_pending'",
    )
    .bind(OrderStatus::Ready.as_str())
    .bind(order.id)
    .execute(&state.db)
    .await;

    match order_update {
        Ok(done) if done.rows_affected() == 1 => {}
        Ok(_) => {
            compensate_kit(&state.db, kit_id, &previous_kit_status, true).await;
            return Err(AppError::StateConflict(format!(
                "order {} left 'qa_pending' while approving",
                order.id
            )));
        }
        Err(e) => {
            compensate_kit(&state.db, kit_id, &previous_kit_status, true).await;
            return Err(e.into());
        }
    }

    info!(
        "Kit {kit_id} approved by {actor}: kit '{previous_kit_status}' -> 'published', \
         order {} 'qa_pending' -> 'ready'",
        order.id
    );

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order.id),
            kit_id: Some(kit_id),
            actor,
            action: "kit_approved",
            detail: json!({
                "kit": { "from": previous_kit_status, "to": KitStatus::Published.as_str() },
                "order": { "from": order_status.as_str(), "to": OrderStatus::Ready.as_str() },
            }),
        },
    )
    .await?;

    if let Some(to) = &order.customer_email {
        if let Err(e) = state.mailer.send_approval_notice(to, &kit.title).await {
            warn!("Approval email for order {} failed: {e}", order.id);
        }
    }

    Ok(())
}

/// Admin mark-paid: `awaiting_payment` -> `paid`, rejected from any other
/// status with an explicit conflict.
pub async fn mark_paid(state: &AppState, order_id: Uuid, actor: &str) -> Result<(), AppError> {
    let order = fetch_order(&state.db, order_id).await?;
    let current = order.status()?;
    let target = mark_paid_transition(current)?;

    let rows = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = now() \
         WHERE id = $2 AND status = 'awaiting_payment'",
    )
    .bind(target.as_str())
    .bind(order_id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(AppError::StateConflict(format!(
            "order {order_id} changed status while marking paid"
        )));
    }

    info!("Order {order_id} marked paid by {actor}");

    record(
        &state.db,
        AuditEntry {
            order_id: Some(order_id),
            kit_id: Some(order.kit_id),
            actor,
            action: "order_marked_paid",
            detail: json!({
                "order": { "from": current.as_str(), "to": target.as_str() },
            }),
        },
    )
    .await?;

    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Delivery
// ────────────────────────────────────────────────────────────────────────────

/// Marks an order delivered after a completed download. Repeat downloads of
/// an already-delivered order are a no-op. Returns whether a transition was
/// applied.
pub async fn mark_delivered(db: &PgPool, order_id: Uuid, kit_id: Uuid) -> Result<bool, AppError> {
    let rows = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = now() \
         WHERE id = $2 AND status IN ('paid', 'ready')",
    )
    .bind(OrderStatus::Delivered.as_str())
    .bind(order_id)
    .execute(db)
    .await?
    .rows_affected();

    if rows == 0 {
        return Ok(false);
    }

    info!("Order {order_id} delivered");

    record(
        db,
        AuditEntry {
            order_id: Some(order_id),
            kit_id: Some(kit_id),
            actor: EXPORT_ACTOR,
            action: "order_delivered",
            detail: json!({ "order": { "to": OrderStatus::Delivered.as_str() } }),
        },
    )
    .await?;

    Ok(true)
}

/// Best-effort rollback of the kit write in a two-write transition.
/// A failure here is logged loudly; the audit trail still has the attempt.
async fn compensate_kit(db: &PgPool, kit_id: Uuid, previous_status: &str, requires_review: bool) {
    let result = sqlx::query(
        "UPDATE kits SET status = $1, requires_review = $2, updated_at = now() WHERE id = $3",
    )
    .bind(previous_status)
    .bind(requires_review)
    .bind(kit_id)
    .execute(db)
    .await;

    if let Err(e) = result {
        error!("Compensating write for kit {kit_id} failed, manual fix needed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_amount_goes_to_paid() {
        let (status, tier) = payment_succeeded_target(4_900);
        assert_eq!(status, OrderStatus::Paid);
        assert_eq!(tier, PlanTier::Standard);
    }

    #[test]
    fn test_premium_amount_goes_to_qa_pending() {
        let (status, tier) = payment_succeeded_target(12_900);
        assert_eq!(status, OrderStatus::QaPending);
        assert_eq!(tier, PlanTier::Premium);
    }

    #[test]
    fn test_threshold_boundary_is_premium() {
        let (status, _) = payment_succeeded_target(10_000);
        assert_eq!(status, OrderStatus::QaPending);
        let (status, _) = payment_succeeded_target(9_999);
        assert_eq!(status, OrderStatus::Paid);
    }

    #[test]
    fn test_mark_paid_only_from_awaiting_payment() {
        assert_eq!(
            mark_paid_transition(OrderStatus::AwaitingPayment).unwrap(),
            OrderStatus::Paid
        );
        for current in [
            OrderStatus::Draft,
            OrderStatus::Paid,
            OrderStatus::QaPending,
            OrderStatus::Ready,
            OrderStatus::Delivered,
        ] {
            assert!(matches!(
                mark_paid_transition(current),
                Err(AppError::StateConflict(_))
            ));
        }
    }

    #[test]
    fn test_approval_requires_review_flag() {
        assert!(matches!(
            approval_preconditions(OrderStatus::QaPending, false),
            Err(AppError::StateConflict(_))
        ));
    }

    #[test]
    fn test_approval_requires_qa_pending_order() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::Ready,
            OrderStatus::Delivered,
        ] {
            assert!(matches!(
                approval_preconditions(status, true),
                Err(AppError::StateConflict(_))
            ));
        }
    }

    #[test]
    fn test_approval_allowed_in_qa_with_review_flag() {
        assert!(approval_preconditions(OrderStatus::QaPending, true).is_ok());
    }
}
