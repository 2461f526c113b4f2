use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CounterStore, StoreError};

/// Redis-backed counter store. The `ConnectionManager` multiplexes one
/// connection and reconnects on failure, so cloning it per call is cheap.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: &mut redis::Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn.clone();
        let value = cmd.query_async(&mut conn).await?;
        Ok(value)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("INCR").arg(key)).await
    }

    async fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("DECR").arg(key)).await
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let added: i64 = self.query(redis::cmd("SADD").arg(set).arg(member)).await?;
        Ok(added == 1)
    }

    async fn srem(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let removed: i64 = self.query(redis::cmd("SREM").arg(set).arg(member)).await?;
        Ok(removed == 1)
    }

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let found: i64 = self
            .query(redis::cmd("SISMEMBER").arg(set).arg(member))
            .await?;
        Ok(found == 1)
    }

    async fn scard(&self, set: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("SCARD").arg(set)).await
    }

    async fn rpush(&self, list: &str, value: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("RPUSH").arg(list).arg(value)).await
    }

    async fn lpop(&self, list: &str) -> Result<Option<String>, StoreError> {
        self.query(redis::cmd("LPOP").arg(list)).await
    }

    async fn llen(&self, list: &str) -> Result<i64, StoreError> {
        self.query(redis::cmd("LLEN").arg(list)).await
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), StoreError> {
        let _: i64 = self.query(redis::cmd("EXPIRE").arg(key).arg(ttl_secs)).await?;
        Ok(())
    }
}
