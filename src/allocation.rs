//! The pessimistic allocation primitive shared by stock reservation, balance
//! movement and durable coupon issuance: take the row's exclusive lock,
//! re-read under it, validate the delta, then write. The lock serializes the
//! read-verify-write sequence per row, which is the whole concurrency story
//! for the synchronous path.

use sea_orm::sea_query::LockType;
use sea_orm::{DatabaseTransaction, EntityTrait, PrimaryKeyTrait, QuerySelect};
use thiserror::Error;

/// `SELECT ... FOR UPDATE` on one row by primary key. Blocks until the lock
/// is granted or the store's lock-wait timeout elapses (which surfaces as a
/// retryable `DbErr`, not a business rejection).
pub async fn fetch_locked<E>(
    txn: &DatabaseTransaction,
    id: <E::PrimaryKey as PrimaryKeyTrait>::ValueType,
) -> Result<Option<E::Model>, sea_orm::DbErr>
where
    E: EntityTrait,
{
    E::find_by_id(id).lock(LockType::Update).one(txn).await
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta would take the value below zero")]
    ShortFall,

    #[error("delta would take the value above the ceiling")]
    CeilingExceeded,
}

/// Validate-and-apply step run under the row lock. The result must stay
/// within `0..=ceiling`; callers map the two violations onto their domain
/// rejection (insufficient stock/balance, balance limit).
pub fn checked_apply(current: i64, delta: i64, ceiling: Option<i64>) -> Result<i64, DeltaError> {
    let next = current.checked_add(delta).ok_or(DeltaError::CeilingExceeded)?;
    if next < 0 {
        return Err(DeltaError::ShortFall);
    }
    if let Some(ceiling) = ceiling {
        if next > ceiling {
            return Err(DeltaError::CeilingExceeded);
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debits_stop_at_zero() {
        assert_eq!(checked_apply(5, -5, None), Ok(0));
        assert_eq!(checked_apply(5, -6, None), Err(DeltaError::ShortFall));
    }

    #[test]
    fn credits_stop_at_the_ceiling() {
        assert_eq!(checked_apply(90, 10, Some(100)), Ok(100));
        assert_eq!(
            checked_apply(91, 10, Some(100)),
            Err(DeltaError::CeilingExceeded)
        );
        assert_eq!(checked_apply(91, 10, None), Ok(101));
    }

    #[test]
    fn overflow_counts_as_a_ceiling_violation() {
        assert_eq!(
            checked_apply(i64::MAX, 1, None),
            Err(DeltaError::CeilingExceeded)
        );
    }
}
