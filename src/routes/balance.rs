use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::balance::TopUpRequest,
    error::AppResult,
    middleware::auth::AuthUser,
    models::Balance,
    response::ApiResponse,
    services::balance_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_balance))
        .route("/top-up", post(top_up))
}

#[utoipa::path(
    get,
    path = "/api/balance",
    responses(
        (status = 200, description = "Current balance", body = ApiResponse<Balance>)
    ),
    tag = "Balance"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Balance>>> {
    let resp = balance_service::get_balance(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/balance/top-up",
    request_body = TopUpRequest,
    responses(
        (status = 200, description = "Balance credited", body = ApiResponse<Balance>),
        (status = 422, description = "Balance limit exceeded"),
    ),
    tag = "Balance"
)]
pub async fn top_up(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<TopUpRequest>,
) -> AppResult<Json<ApiResponse<Balance>>> {
    let resp = balance_service::top_up(&state, &user, payload).await?;
    Ok(Json(resp))
}
