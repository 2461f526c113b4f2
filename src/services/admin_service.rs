use crate::{
    dto::admin::{IssuanceDepth, RedriveResult},
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    queue::IssuanceQueue,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn issuance_depth(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<IssuanceDepth>> {
    ensure_admin(user)?;
    let queue = IssuanceQueue::new(state.counters.clone());
    let data = IssuanceDepth {
        queued: queue.len().await?,
        dead_lettered: queue.dead_letter_len().await?,
    };
    Ok(ApiResponse::success("Issuance depth", data, Some(Meta::empty())))
}

/// Push dead-lettered claims back onto the main queue for the worker to
/// retry. Bounded by the configured batch size per call so a large backlog
/// is drained deliberately rather than in one burst.
pub async fn redrive_dead_letters(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<RedriveResult>> {
    ensure_admin(user)?;
    let queue = IssuanceQueue::new(state.counters.clone());
    let moved = queue.redrive(state.config.issuance_batch_size).await?;

    tracing::info!(moved, "dead-letter redrive requested");

    Ok(ApiResponse::success(
        "Redrive complete",
        RedriveResult { moved },
        Some(Meta::empty()),
    ))
}
