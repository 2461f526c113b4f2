use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// The handful of atomic operations the admission path and the issuance queue
/// need from the shared low-latency store. Every mutation is atomic on the
/// store side; application code never does read-modify-write against it.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment, returning the post-increment value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Atomically decrement, returning the post-decrement value.
    async fn decr(&self, key: &str) -> Result<i64, StoreError>;

    /// Add-if-absent. Returns `true` when this call inserted the member.
    async fn sadd(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member. Returns `true` when the member was present.
    async fn srem(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn sismember(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn scard(&self, set: &str) -> Result<i64, StoreError>;

    /// Append to the tail of a list.
    async fn rpush(&self, list: &str, value: &str) -> Result<i64, StoreError>;

    /// Pop from the head of a list, `None` when empty.
    async fn lpop(&self, list: &str) -> Result<Option<String>, StoreError>;

    async fn llen(&self, list: &str) -> Result<i64, StoreError>;

    async fn expire(&self, key: &str, ttl_secs: i64) -> Result<(), StoreError>;
}
