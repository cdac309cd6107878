use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;

/// Orders at or above this amount (minor currency units) are premium and
/// go through admin QA before release.
pub const PREMIUM_THRESHOLD_CENTS: i64 = 10_000;

pub const STANDARD_PRICE_CENTS: i64 = 4_900;
pub const PREMIUM_PRICE_CENTS: i64 = 12_900;

/// Order lifecycle status. `Delivered` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    AwaitingPayment,
    Paid,
    QaPending,
    Ready,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::QaPending => "qa_pending",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
        }
    }

    /// Statuses that permit export/download of the kit.
    pub fn is_deliverable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Ready | OrderStatus::Delivered
        )
    }

    /// Statuses that represent a completed payment (any point at or past
    /// `paid`). Used by the regeneration limiter.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::QaPending | OrderStatus::Ready | OrderStatus::Delivered
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "awaiting_payment" => Ok(OrderStatus::AwaitingPayment),
            "paid" => Ok(OrderStatus::Paid),
            "qa_pending" => Ok(OrderStatus::QaPending),
            "ready" => Ok(OrderStatus::Ready),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Standard,
    Premium,
}

impl PlanTier {
    /// Tier is derived from the order amount, not stored preferences.
    pub fn from_amount_cents(amount_cents: i64) -> PlanTier {
        if amount_cents >= PREMIUM_THRESHOLD_CENTS {
            PlanTier::Premium
        } else {
            PlanTier::Standard
        }
    }

    pub fn price_cents(&self) -> i64 {
        match self {
            PlanTier::Standard => STANDARD_PRICE_CENTS,
            PlanTier::Premium => PREMIUM_PRICE_CENTS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Standard => "standard",
            PlanTier::Premium => "premium",
        }
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(PlanTier::Standard),
            "premium" => Ok(PlanTier::Premium),
            other => Err(format!("unknown plan '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderRow {
    pub id: Uuid,
    pub kit_id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub plan: String,
    pub checkout_session_id: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn status(&self) -> Result<OrderStatus, AppError> {
        self.status
            .parse()
            .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
    }
}

pub async fn fetch_order(db: &sqlx::PgPool, id: Uuid) -> Result<OrderRow, AppError> {
    sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))
}

/// Most recent order for a kit, if any.
pub async fn latest_order_for_kit(
    db: &sqlx::PgPool,
    kit_id: Uuid,
) -> Result<Option<OrderRow>, AppError> {
    Ok(sqlx::query_as::<_, OrderRow>(
        "SELECT * FROM orders WHERE kit_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(kit_id)
    .fetch_optional(db)
    .await?)
}

/// True when any order for the kit has reached a paid status.
pub async fn kit_has_paid_order(db: &sqlx::PgPool, kit_id: Uuid) -> Result<bool, AppError> {
    Ok(sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM orders WHERE kit_id = $1 \
         AND status IN ('paid', 'qa_pending', 'ready', 'delivered'))",
    )
    .bind(kit_id)
    .fetch_one(db)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_threshold_is_deterministic() {
        assert_eq!(PlanTier::from_amount_cents(4_900), PlanTier::Standard);
        assert_eq!(PlanTier::from_amount_cents(9_999), PlanTier::Standard);
        assert_eq!(PlanTier::from_amount_cents(10_000), PlanTier::Premium);
        assert_eq!(PlanTier::from_amount_cents(12_900), PlanTier::Premium);
    }

    #[test]
    fn test_deliverable_statuses() {
        assert!(OrderStatus::Paid.is_deliverable());
        assert!(OrderStatus::Ready.is_deliverable());
        assert!(OrderStatus::Delivered.is_deliverable());
        assert!(!OrderStatus::QaPending.is_deliverable());
        assert!(!OrderStatus::AwaitingPayment.is_deliverable());
        assert!(!OrderStatus::Draft.is_deliverable());
    }

    #[test]
    fn test_paid_statuses_include_qa_pending() {
        assert!(OrderStatus::QaPending.is_paid());
        assert!(!OrderStatus::AwaitingPayment.is_paid());
    }

    #[test]
    fn test_order_status_round_trips() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::QaPending,
            OrderStatus::Ready,
            OrderStatus::Delivered,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
