use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::coupons::{ClaimReceipt, CouponList, IssuedCouponList},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::Pagination,
    services::coupon_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons))
        .route("/mine", get(my_coupons))
        .route("/{id}/claims", post(claim_coupon))
}

#[utoipa::path(
    get,
    path = "/api/coupons",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Active coupon campaigns", body = ApiResponse<CouponList>)
    ),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CouponList>>> {
    let resp = coupon_service::list_coupons(&state, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/coupons/{id}/claims",
    params(
        ("id" = Uuid, Path, description = "Coupon ID")
    ),
    responses(
        (status = 200, description = "Claim admitted and queued", body = ApiResponse<ClaimReceipt>),
        (status = 409, description = "Already claimed or sold out"),
        (status = 422, description = "Campaign window closed"),
    ),
    tag = "Coupons"
)]
pub async fn claim_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ClaimReceipt>>> {
    let resp = coupon_service::claim_coupon(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/coupons/mine",
    responses(
        (status = 200, description = "Caller's issued coupons", body = ApiResponse<IssuedCouponList>)
    ),
    tag = "Coupons"
)]
pub async fn my_coupons(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<IssuedCouponList>>> {
    let resp = coupon_service::my_coupons(&state, &user).await?;
    Ok(Json(resp))
}
