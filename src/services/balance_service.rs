use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};

use crate::{
    allocation::{DeltaError, checked_apply, fetch_locked},
    audit::log_audit,
    dto::balance::TopUpRequest,
    entity::balances::{ActiveModel as BalanceActive, Entity as Balances, Model as BalanceModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Balance,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_balance(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Balance>> {
    let balance = Balances::find_by_id(user.user_id).one(&state.orm).await?;
    let data = match balance {
        Some(model) => balance_from_entity(model),
        None => Balance {
            user_id: user.user_id,
            amount: 0,
            updated_at: Utc::now(),
        },
    };
    Ok(ApiResponse::success("Balance", data, Some(Meta::empty())))
}

/// Credit the account under its row lock. The ceiling check runs against the
/// value re-read under the lock, so racing top-ups cannot stack past the
/// configured limit; a top-up landing exactly on the ceiling succeeds.
pub async fn top_up(
    state: &AppState,
    user: &AuthUser,
    payload: TopUpRequest,
) -> AppResult<ApiResponse<Balance>> {
    if payload.amount <= 0 {
        return Err(AppError::BadRequest("Amount must be positive".into()));
    }

    let txn = state.orm.begin().await?;

    // Accounts created before the balances table get their row lazily.
    let balance = match fetch_locked::<Balances>(&txn, user.user_id).await? {
        Some(model) => model,
        None => {
            BalanceActive {
                user_id: Set(user.user_id),
                amount: Set(0),
                updated_at: Set(Utc::now().into()),
            }
            .insert(&txn)
            .await?
        }
    };

    let next = checked_apply(balance.amount, payload.amount, Some(state.config.balance_ceiling))
        .map_err(|err| match err {
            DeltaError::CeilingExceeded => AppError::BalanceLimitExceeded,
            DeltaError::ShortFall => AppError::BadRequest("Amount must be positive".into()),
        })?;

    let mut active: BalanceActive = balance.into();
    active.amount = Set(next);
    active.updated_at = Set(Utc::now().into());
    let balance = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "balance_top_up",
        Some("balances"),
        Some(serde_json::json!({ "amount": payload.amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Balance updated",
        balance_from_entity(balance),
        Some(Meta::empty()),
    ))
}

fn balance_from_entity(model: BalanceModel) -> Balance {
    Balance {
        user_id: model.user_id,
        amount: model.amount,
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
