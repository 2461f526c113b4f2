use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::queue::{IssuanceClaim, IssuanceQueue};
use crate::store::CounterStore;

pub fn admitted_key(coupon_id: Uuid) -> String {
    format!("coupon:{coupon_id}:admitted")
}

pub fn claimants_key(coupon_id: Uuid) -> String {
    format!("coupon:{coupon_id}:claimants")
}

/// Fast-path admission for one coupon claim. Decides on counter-store state
/// only; the caller has already verified that the coupon exists and its
/// campaign window is open. Durable issuance happens later, off the queue.
///
/// SADD is the arbiter for duplicates: add-if-absent is atomic, so two
/// in-flight claims for the same (coupon, user) cannot both pass it. INCR is
/// the arbiter for capacity: increments on one key are serialized by the
/// store, so at most `capacity` callers ever see a post-increment value
/// within bounds. Every rejection compensates its own mutations, leaving
/// shared state exactly as it found it.
pub async fn admit_claim(
    store: &dyn CounterStore,
    queue: &IssuanceQueue,
    coupon_id: Uuid,
    capacity: i32,
    key_ttl_secs: i64,
    user_id: Uuid,
) -> AppResult<i64> {
    let claimants = claimants_key(coupon_id);
    let admitted = admitted_key(coupon_id);
    let user = user_id.to_string();

    // Repeat clicks stop here without the caller's durable read having been
    // worth anything; racing first claims fall through to the SADD below.
    if store.sismember(&claimants, &user).await? {
        return Err(AppError::DuplicateClaim);
    }

    if !store.sadd(&claimants, &user).await? {
        return Err(AppError::DuplicateClaim);
    }

    let position = store.incr(&admitted).await?;
    if position > capacity as i64 {
        store.decr(&admitted).await?;
        store.srem(&claimants, &user).await?;
        return Err(AppError::CouponSoldOut);
    }

    if position == 1 {
        store.expire(&admitted, key_ttl_secs).await?;
        store.expire(&claimants, key_ttl_secs).await?;
    }

    // A push failure after this point loses the admitted slot; the durable
    // side never saw the claim, so nothing over-allocates.
    queue.push(&IssuanceClaim::new(coupon_id, user_id)).await?;

    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const TTL: i64 = 3600;

    fn setup() -> (Arc<MemoryStore>, IssuanceQueue) {
        let store = Arc::new(MemoryStore::new());
        let queue = IssuanceQueue::new(store.clone());
        (store, queue)
    }

    #[tokio::test]
    async fn admits_until_capacity_then_rejects() {
        let (store, queue) = setup();
        let coupon = Uuid::new_v4();

        for i in 1..=3 {
            let pos = admit_claim(store.as_ref(), &queue, coupon, 3, TTL, Uuid::new_v4())
                .await
                .unwrap();
            assert_eq!(pos, i);
        }

        let err = admit_claim(store.as_ref(), &queue, coupon, 3, TTL, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CouponSoldOut));

        // The rejected claim compensated its increment and set insert.
        assert_eq!(store.scard(&claimants_key(coupon)).await.unwrap(), 3);
        assert_eq!(queue.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn second_claim_by_same_user_is_a_duplicate() {
        let (store, queue) = setup();
        let coupon = Uuid::new_v4();
        let user = Uuid::new_v4();

        admit_claim(store.as_ref(), &queue, coupon, 10, TTL, user)
            .await
            .unwrap();
        let err = admit_claim(store.as_ref(), &queue, coupon, 10, TTL, user)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateClaim));
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_rejection_leaves_the_counter_untouched() {
        let (store, queue) = setup();
        let coupon = Uuid::new_v4();
        let user = Uuid::new_v4();

        admit_claim(store.as_ref(), &queue, coupon, 10, TTL, user)
            .await
            .unwrap();
        let _ = admit_claim(store.as_ref(), &queue, coupon, 10, TTL, user).await;

        assert_eq!(store.incr(&admitted_key(coupon)).await.unwrap(), 2);
    }

    // Flash-sale shape: capacity 50, 100 distinct users racing.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_burst_never_over_admits() {
        let (store, queue) = setup();
        let coupon = Uuid::new_v4();
        let capacity = 50;

        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                admit_claim(store.as_ref(), &queue, coupon, capacity, TTL, Uuid::new_v4()).await
            }));
        }

        let mut admitted = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(AppError::CouponSoldOut) => sold_out += 1,
                Err(other) => panic!("unexpected admission outcome: {other}"),
            }
        }

        assert_eq!(admitted, 50);
        assert_eq!(sold_out, 50);
        assert_eq!(store.scard(&claimants_key(coupon)).await.unwrap(), 50);
        assert_eq!(queue.len().await.unwrap(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_claims_by_one_user_admit_exactly_once() {
        let (store, queue) = setup();
        let coupon = Uuid::new_v4();
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                admit_claim(store.as_ref(), &queue, coupon, 100, TTL, user).await
            }));
        }

        let admitted = {
            let mut n = 0;
            for handle in handles {
                if handle.await.unwrap().is_ok() {
                    n += 1;
                }
            }
            n
        };

        assert_eq!(admitted, 1);
        assert_eq!(queue.len().await.unwrap(), 1);
    }
}
