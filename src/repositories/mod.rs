//! Short-lived keyed state: rate-limit counters and spent refresh tokens.

mod memory;
mod redis_repo;

pub use memory::MemoryStore;
pub use redis_repo::RedisRepository;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

/// Expiring keys shared by every request handler.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Increment the counter at `key`, creating it with lifetime `ttl` if it
    /// does not exist. Returns the value after incrementing.
    async fn hit(&self, key: &str, ttl: Duration) -> AppResult<u64>;

    /// Set `key` for `ttl` only if it is absent. Returns `true` for the one
    /// caller that set it.
    async fn claim(&self, key: &str, ttl: Duration) -> AppResult<bool>;
}
