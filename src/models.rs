use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub sales_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub name: String,
    /// Discount in basis points (100bp = 1%).
    pub discount_bp: i32,
    pub capacity: i32,
    pub issued_count: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub valid_hours: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IssuedCoupon {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub status: CouponStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub final_amount: i64,
    pub issued_coupon_id: Option<Uuid>,
    pub invoice_number: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    pub user_id: Uuid,
    pub amount: i64,
    pub updated_at: DateTime<Utc>,
}

/// pending -> paid and pending -> cancelled; both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_payable(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Available,
    Used,
    Expired,
}

impl CouponStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponStatus::Available => "available",
            CouponStatus::Used => "used",
            CouponStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(CouponStatus::Available),
            "used" => Some(CouponStatus::Used),
            "expired" => Some(CouponStatus::Expired),
            _ => None,
        }
    }
}

/// Expiry is computed at read time: an `available` instance past its
/// `expires_at` reports `expired` without anyone having to touch the row.
pub fn effective_coupon_status(
    stored: CouponStatus,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CouponStatus {
    match stored {
        CouponStatus::Available if expires_at <= now => CouponStatus::Expired,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn order_status_round_trips_through_text() {
        for status in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Cancelled] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn only_pending_orders_are_payable_or_cancellable() {
        assert!(OrderStatus::Pending.is_payable());
        assert!(OrderStatus::Pending.is_cancellable());
        for status in [OrderStatus::Paid, OrderStatus::Cancelled] {
            assert!(!status.is_payable());
            assert!(!status.is_cancellable());
        }
    }

    #[test]
    fn available_coupons_expire_at_read_time() {
        let now = Utc::now();
        let live = effective_coupon_status(CouponStatus::Available, now + Duration::hours(1), now);
        assert_eq!(live, CouponStatus::Available);

        let stale = effective_coupon_status(CouponStatus::Available, now - Duration::hours(1), now);
        assert_eq!(stale, CouponStatus::Expired);

        // A used coupon stays used even past its expiry.
        let used = effective_coupon_status(CouponStatus::Used, now - Duration::hours(1), now);
        assert_eq!(used, CouponStatus::Used);
    }
}
