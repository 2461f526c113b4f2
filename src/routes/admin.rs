use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::admin::{IssuanceDepth, RedriveResult},
    dto::coupons::CreateCouponRequest,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Coupon,
    response::ApiResponse,
    services::{admin_service, coupon_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/coupons", post(create_coupon))
        .route("/issuance", get(issuance_depth))
        .route("/issuance/redrive", post(redrive_dead_letters))
}

#[utoipa::path(
    post,
    path = "/api/admin/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon campaign created", body = ApiResponse<Coupon>),
        (status = 403, description = "Admin only"),
    ),
    tag = "Admin"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCouponRequest>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let resp = coupon_service::create_coupon(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/issuance",
    responses(
        (status = 200, description = "Queue and dead-letter depth", body = ApiResponse<IssuanceDepth>),
        (status = 403, description = "Admin only"),
    ),
    tag = "Admin"
)]
pub async fn issuance_depth(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<IssuanceDepth>>> {
    let resp = admin_service::issuance_depth(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/issuance/redrive",
    responses(
        (status = 200, description = "Dead letters moved back to the queue", body = ApiResponse<RedriveResult>),
        (status = 403, description = "Admin only"),
    ),
    tag = "Admin"
)]
pub async fn redrive_dead_letters(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<RedriveResult>>> {
    let resp = admin_service::redrive_dead_letters(&state, &user).await?;
    Ok(Json(resp))
}
