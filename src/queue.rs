use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::store::{CounterStore, StoreError};

pub const QUEUE_KEY: &str = "coupon:issue:queue";
pub const DEAD_LETTER_KEY: &str = "coupon:issue:dead";

/// An admitted-but-unpersisted coupon claim. Lives only on the queue as the
/// textual token `"{coupon_id}:{user_id}"`; re-processing a duplicate is safe
/// because durable issuance rejects a second row for the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuanceClaim {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
}

impl IssuanceClaim {
    pub fn new(coupon_id: Uuid, user_id: Uuid) -> Self {
        Self { coupon_id, user_id }
    }
}

impl fmt::Display for IssuanceClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.coupon_id, self.user_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimParseError {
    #[error("claim token has {0} fields, expected 2")]
    FieldCount(usize),

    #[error("claim token carries an unparsable id: {0}")]
    BadId(#[from] uuid::Error),
}

impl FromStr for IssuanceClaim {
    type Err = ClaimParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = token.split(':').collect();
        if fields.len() != 2 {
            return Err(ClaimParseError::FieldCount(fields.len()));
        }
        Ok(Self {
            coupon_id: Uuid::parse_str(fields[0])?,
            user_id: Uuid::parse_str(fields[1])?,
        })
    }
}

/// FIFO channel between admission and the issuance worker, plus the
/// dead-letter list for claims that failed for retryable reasons.
#[derive(Clone)]
pub struct IssuanceQueue {
    store: Arc<dyn CounterStore>,
}

impl IssuanceQueue {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn push(&self, claim: &IssuanceClaim) -> Result<(), StoreError> {
        self.store.rpush(QUEUE_KEY, &claim.to_string()).await?;
        Ok(())
    }

    /// Pop the oldest raw token. The worker parses it so that malformed
    /// entries can still be routed to the dead-letter list.
    pub async fn pop(&self) -> Result<Option<String>, StoreError> {
        self.store.lpop(QUEUE_KEY).await
    }

    pub async fn dead_letter(&self, token: &str) -> Result<(), StoreError> {
        self.store.rpush(DEAD_LETTER_KEY, token).await?;
        Ok(())
    }

    /// Move up to `max` dead-lettered tokens back onto the main queue.
    /// Returns how many were moved.
    pub async fn redrive(&self, max: usize) -> Result<usize, StoreError> {
        let mut moved = 0;
        while moved < max {
            let Some(token) = self.store.lpop(DEAD_LETTER_KEY).await? else {
                break;
            };
            self.store.rpush(QUEUE_KEY, &token).await?;
            moved += 1;
        }
        Ok(moved)
    }

    pub async fn len(&self) -> Result<i64, StoreError> {
        self.store.llen(QUEUE_KEY).await
    }

    pub async fn dead_letter_len(&self) -> Result<i64, StoreError> {
        self.store.llen(DEAD_LETTER_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn claim_token_round_trips() {
        let claim = IssuanceClaim::new(Uuid::new_v4(), Uuid::new_v4());
        let parsed: IssuanceClaim = claim.to_string().parse().unwrap();
        assert_eq!(parsed, claim);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            "one-field".parse::<IssuanceClaim>(),
            Err(ClaimParseError::FieldCount(1))
        );
        assert_eq!(
            "a:b:c".parse::<IssuanceClaim>(),
            Err(ClaimParseError::FieldCount(3))
        );
        assert!(matches!(
            "not-a-uuid:also-not".parse::<IssuanceClaim>(),
            Err(ClaimParseError::BadId(_))
        ));
    }

    #[tokio::test]
    async fn queue_preserves_fifo_order() {
        let queue = IssuanceQueue::new(Arc::new(MemoryStore::new()));
        let first = IssuanceClaim::new(Uuid::new_v4(), Uuid::new_v4());
        let second = IssuanceClaim::new(Uuid::new_v4(), Uuid::new_v4());
        queue.push(&first).await.unwrap();
        queue.push(&second).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.pop().await.unwrap().unwrap(), first.to_string());
        assert_eq!(queue.pop().await.unwrap().unwrap(), second.to_string());
        assert_eq!(queue.pop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn redrive_moves_dead_letters_back_in_order() {
        let queue = IssuanceQueue::new(Arc::new(MemoryStore::new()));
        queue.dead_letter("t1").await.unwrap();
        queue.dead_letter("t2").await.unwrap();
        queue.dead_letter("t3").await.unwrap();

        let moved = queue.redrive(2).await.unwrap();
        assert_eq!(moved, 2);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
        assert_eq!(queue.pop().await.unwrap().as_deref(), Some("t1"));
        assert_eq!(queue.pop().await.unwrap().as_deref(), Some("t2"));
    }
}
