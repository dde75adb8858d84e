//! Redis-backed expiring counters and set-once keys.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

use super::EphemeralStore;
use crate::error::{AppError, AppResult};

const KEY_PREFIX: &str = "rolegate:";

fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Redis rejects `EX 0`; round sub-second TTLs up.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// One auto-reconnecting multiplexed connection shared by all requests.
#[derive(Clone)]
pub struct RedisRepository {
    conn: ConnectionManager,
}

impl RedisRepository {
    /// Connect to the Redis at `redis_url`.
    pub async fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Cheap handle onto the shared connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl EphemeralStore for RedisRepository {
    async fn hit(&self, key: &str, ttl: Duration) -> AppResult<u64> {
        let mut conn = self.connection();
        let key = namespaced(key);
        // Seed with the expiry only when absent; INCR keeps the existing TTL.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn claim(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.connection();
        let key = namespaced(key);
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        debug!(key = %key, claimed = set.is_some(), "claim");
        Ok(set.is_some())
    }
}
