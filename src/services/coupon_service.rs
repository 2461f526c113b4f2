use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    admission,
    allocation::fetch_locked,
    audit::log_audit,
    db::OrmConn,
    dto::coupons::{ClaimReceipt, CouponList, CreateCouponRequest, IssuedCouponList},
    entity::{
        coupons::{
            ActiveModel as CouponActive, Column as CouponCol, Entity as Coupons,
            Model as CouponModel,
        },
        issued_coupons::{
            ActiveModel as IssuedActive, Column as IssuedCol, Entity as IssuedCoupons,
            Model as IssuedModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Coupon, CouponStatus, IssuedCoupon, effective_coupon_status},
    queue::IssuanceQueue,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_coupons(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CouponList>> {
    let (page, limit, offset) = pagination.normalize();
    let now = Utc::now();

    let finder = Coupons::find()
        .filter(
            Condition::all()
                .add(CouponCol::StartsAt.lte(now))
                .add(CouponCol::EndsAt.gt(now)),
        )
        .order_by_asc(CouponCol::EndsAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(coupon_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Coupons", CouponList { items }, Some(meta)))
}

/// Fast-path claim: one plain coupon read, then counter-store admission.
/// Returns as soon as the claim is on the queue; the worker persists it.
/// The read here is not a race concern because capacity is enforced by the
/// admission counter and, finally, by the durable re-check in
/// [`issue_durable`].
pub async fn claim_coupon(
    state: &AppState,
    user: &AuthUser,
    coupon_id: Uuid,
) -> AppResult<ApiResponse<ClaimReceipt>> {
    let coupon = Coupons::find_by_id(coupon_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let now = Utc::now();
    ensure_window(&coupon, now)?;

    // Admission keys outlive the campaign window by a day so late worker
    // drains still see them, then expire on their own.
    let key_ttl_secs =
        (coupon.ends_at.with_timezone(&Utc) - now).num_seconds().max(0) + 86_400;

    let queue = IssuanceQueue::new(state.counters.clone());
    let position = admission::admit_claim(
        state.counters.as_ref(),
        &queue,
        coupon.id,
        coupon.capacity,
        key_ttl_secs,
        user.user_id,
    )
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_claim",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id, "position": position })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Claim queued",
        ClaimReceipt {
            coupon_id: coupon.id,
            user_id: user.user_id,
            position,
        },
        Some(Meta::empty()),
    ))
}

pub async fn my_coupons(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<IssuedCouponList>> {
    let now = Utc::now();
    let items = IssuedCoupons::find()
        .filter(IssuedCol::UserId.eq(user.user_id))
        .order_by_desc(IssuedCol::IssuedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|model| issued_from_entity(model, now))
        .collect();

    Ok(ApiResponse::success(
        "Issued coupons",
        IssuedCouponList { items },
        Some(Meta::empty()),
    ))
}

/// Durable issuance for one admitted claim, in a single transaction. The
/// coupon row lock serializes issued-count updates; the (coupon, user)
/// lookup is the final duplicate arbiter regardless of what the fast path
/// saw. Early returns roll the transaction back.
pub async fn issue_durable(
    orm: &OrmConn,
    coupon_id: Uuid,
    user_id: Uuid,
) -> AppResult<IssuedModel> {
    let txn = orm.begin().await?;

    let coupon = fetch_locked::<Coupons>(&txn, coupon_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let now = Utc::now();
    ensure_window(&coupon, now)?;

    let already_issued = IssuedCoupons::find()
        .filter(
            Condition::all()
                .add(IssuedCol::CouponId.eq(coupon_id))
                .add(IssuedCol::UserId.eq(user_id)),
        )
        .one(&txn)
        .await?;
    if already_issued.is_some() {
        return Err(AppError::DuplicateClaim);
    }

    if coupon.issued_count >= coupon.capacity {
        return Err(AppError::CouponSoldOut);
    }

    let expires_at = now + Duration::hours(coupon.valid_hours as i64);
    let issued = IssuedActive {
        id: Set(Uuid::new_v4()),
        coupon_id: Set(coupon_id),
        user_id: Set(user_id),
        status: Set(CouponStatus::Available.as_str().into()),
        issued_at: Set(now.into()),
        expires_at: Set(expires_at.into()),
        used_at: Set(None),
    }
    .insert(&txn)
    .await?;

    let issued_count = coupon.issued_count + 1;
    let mut active: CouponActive = coupon.into();
    active.issued_count = Set(issued_count);
    active.update(&txn).await?;

    txn.commit().await?;

    Ok(issued)
}

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_admin(user)?;

    if payload.capacity <= 0 {
        return Err(AppError::BadRequest("Capacity must be positive".into()));
    }
    if !(0..=10_000).contains(&payload.discount_bp) {
        return Err(AppError::BadRequest(
            "Discount must be between 0 and 10000 basis points".into(),
        ));
    }
    if payload.ends_at <= payload.starts_at {
        return Err(AppError::BadRequest("Window must end after it starts".into()));
    }
    if payload.valid_hours <= 0 {
        return Err(AppError::BadRequest("Validity must be positive".into()));
    }

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        discount_bp: Set(payload.discount_bp),
        capacity: Set(payload.capacity),
        issued_count: Set(0),
        starts_at: Set(payload.starts_at.into()),
        ends_at: Set(payload.ends_at.into()),
        valid_hours: Set(payload.valid_hours),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

fn ensure_window(coupon: &CouponModel, now: DateTime<Utc>) -> AppResult<()> {
    let starts_at = coupon.starts_at.with_timezone(&Utc);
    let ends_at = coupon.ends_at.with_timezone(&Utc);
    if now < starts_at || now >= ends_at {
        return Err(AppError::CouponNotActive);
    }
    Ok(())
}

fn coupon_from_entity(model: CouponModel) -> Coupon {
    Coupon {
        id: model.id,
        name: model.name,
        discount_bp: model.discount_bp,
        capacity: model.capacity,
        issued_count: model.issued_count,
        starts_at: model.starts_at.with_timezone(&Utc),
        ends_at: model.ends_at.with_timezone(&Utc),
        valid_hours: model.valid_hours,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn issued_from_entity(model: IssuedModel, now: DateTime<Utc>) -> IssuedCoupon {
    let stored = CouponStatus::parse(&model.status).unwrap_or(CouponStatus::Expired);
    let expires_at = model.expires_at.with_timezone(&Utc);
    IssuedCoupon {
        id: model.id,
        coupon_id: model.coupon_id,
        user_id: model.user_id,
        status: effective_coupon_status(stored, expires_at, now),
        issued_at: model.issued_at.with_timezone(&Utc),
        expires_at,
        used_at: model.used_at.map(|dt| dt.with_timezone(&Utc)),
    }
}
