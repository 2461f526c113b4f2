use std::time::Duration;

use crate::db::OrmConn;
use crate::error::{AppError, AppResult};
use crate::queue::{IssuanceClaim, IssuanceQueue};
use crate::services::coupon_service;

/// Periodic bounded consumer of the issuance queue. One tick runs at a time,
/// so the durable issuance batch itself needs no locking; the queue is what
/// turns an unbounded admission burst into a rate-limited write stream.
pub struct IssuanceWorker {
    orm: OrmConn,
    queue: IssuanceQueue,
    batch_size: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub issued: usize,
    pub dropped: usize,
    pub dead_lettered: usize,
}

impl IssuanceWorker {
    pub fn new(orm: OrmConn, queue: IssuanceQueue, batch_size: usize) -> Self {
        Self {
            orm,
            queue,
            batch_size,
        }
    }

    /// Tick forever on a fixed period, independent of request volume.
    pub async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(stats) if stats != TickStats::default() => {
                    tracing::info!(
                        issued = stats.issued,
                        dropped = stats.dropped,
                        dead_lettered = stats.dead_lettered,
                        "issuance tick drained"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "issuance tick failed");
                }
            }
        }
    }

    /// Drain up to `batch_size` claims, stopping early when the queue is
    /// empty. Business rejections are dropped (retrying cannot change a
    /// business fact), missing rows are dropped with a log line, everything
    /// else goes to the dead-letter list for reprocessing.
    pub async fn tick(&self) -> AppResult<TickStats> {
        let mut stats = TickStats::default();

        for _ in 0..self.batch_size {
            let Some(token) = self.queue.pop().await? else {
                break;
            };

            let claim: IssuanceClaim = match token.parse() {
                Ok(claim) => claim,
                Err(err) => {
                    // A parsing failure will never become parseable; park it
                    // where an operator can see it instead of retrying.
                    tracing::warn!(token = %token, error = %err, "malformed claim token");
                    self.queue.dead_letter(&token).await?;
                    stats.dead_lettered += 1;
                    continue;
                }
            };

            match coupon_service::issue_durable(&self.orm, claim.coupon_id, claim.user_id).await {
                Ok(_) => stats.issued += 1,
                Err(err) if err.is_business_rejection() => {
                    tracing::info!(
                        coupon_id = %claim.coupon_id,
                        user_id = %claim.user_id,
                        outcome = %err,
                        "claim dropped"
                    );
                    stats.dropped += 1;
                }
                Err(AppError::NotFound) => {
                    tracing::warn!(
                        coupon_id = %claim.coupon_id,
                        user_id = %claim.user_id,
                        "claim references a missing coupon, dropping"
                    );
                    stats.dropped += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        coupon_id = %claim.coupon_id,
                        user_id = %claim.user_id,
                        error = %err,
                        "durable issuance failed, dead-lettering claim"
                    );
                    self.queue.dead_letter(&token).await?;
                    stats.dead_lettered += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CounterStore, MemoryStore};
    use sea_orm::DatabaseConnection;
    use std::sync::Arc;
    use uuid::Uuid;

    fn worker_without_db(store: Arc<MemoryStore>, batch: usize) -> IssuanceWorker {
        IssuanceWorker::new(
            DatabaseConnection::Disconnected,
            IssuanceQueue::new(store),
            batch,
        )
    }

    #[tokio::test]
    async fn empty_queue_makes_an_idle_tick() {
        let worker = worker_without_db(Arc::new(MemoryStore::new()), 10);
        assert_eq!(worker.tick().await.unwrap(), TickStats::default());
    }

    #[tokio::test]
    async fn malformed_tokens_go_to_the_dead_letter_list_once() {
        let store = Arc::new(MemoryStore::new());
        let queue = IssuanceQueue::new(store.clone());
        store.rpush(crate::queue::QUEUE_KEY, "garbage").await.unwrap();

        let worker = worker_without_db(store, 10);
        let stats = worker.tick().await.unwrap();

        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.issued, 0);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_durable_failure_dead_letters_the_claim() {
        // A disconnected ORM handle makes durable issuance fail with a
        // connection error, the transient class.
        let store = Arc::new(MemoryStore::new());
        let queue = IssuanceQueue::new(store.clone());
        let claim = IssuanceClaim::new(Uuid::new_v4(), Uuid::new_v4());
        queue.push(&claim).await.unwrap();

        let worker = worker_without_db(store, 10);
        let stats = worker.tick().await.unwrap();

        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.dropped, 0);
        assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn a_tick_respects_the_batch_ceiling() {
        let store = Arc::new(MemoryStore::new());
        let queue = IssuanceQueue::new(store.clone());
        for _ in 0..5 {
            store.rpush(crate::queue::QUEUE_KEY, "garbage").await.unwrap();
        }

        let worker = worker_without_db(store, 3);
        let stats = worker.tick().await.unwrap();

        assert_eq!(stats.dead_lettered, 3);
        assert_eq!(queue.len().await.unwrap(), 2);
    }
}
