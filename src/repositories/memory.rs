//! In-process `EphemeralStore` for tests and single-node runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::EphemeralStore;
use crate::error::AppResult;

const PURGE_THRESHOLD: usize = 4096;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn hit(&self, key: &str, ttl: Duration) -> AppResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.len() > PURGE_THRESHOLD {
            entries.retain(|_, (_, expires)| *expires > now);
        }
        let entry = entries
            .entry(key.to_string())
            .and_modify(|(count, expires)| {
                if *expires <= now {
                    *count = 0;
                    *expires = now + ttl;
                }
            })
            .or_insert((0, now + ttl));
        entry.0 += 1;
        Ok(entry.0)
    }

    async fn claim(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires)) if *expires > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (1, now + ttl));
                Ok(true)
            }
        }
    }
}
