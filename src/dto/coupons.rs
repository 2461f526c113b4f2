use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Coupon, IssuedCoupon};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub name: String,
    /// Discount in basis points (100bp = 1%).
    pub discount_bp: i32,
    pub capacity: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Lifetime of each issued instance, in hours.
    pub valid_hours: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponList {
    pub items: Vec<Coupon>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedCouponList {
    pub items: Vec<IssuedCoupon>,
}

/// Returned immediately on admission; durable issuance happens later off the
/// queue, so this is an acknowledgement, not a coupon.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimReceipt {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    /// 1-based admission slot out of the coupon's capacity.
    pub position: i64,
}
