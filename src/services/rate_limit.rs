//! Per-subject fixed-window request throttling for guarded routes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::repositories::EphemeralStore;

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn EphemeralStore>,
    requests_per_window: u64,
    window: Duration,
}

impl RateLimiter {
    /// `requests_per_window == 0` disables the limiter.
    pub fn new(store: Arc<dyn EphemeralStore>, requests_per_window: u64, window: Duration) -> Self {
        Self {
            store,
            requests_per_window,
            window: window.max(Duration::from_secs(1)),
        }
    }

    /// Count one request for `subject`; `RateLimited` once the window's budget is spent.
    pub async fn check(&self, subject: Uuid) -> AppResult<()> {
        if self.requests_per_window == 0 {
            return Ok(());
        }
        let window_secs = self.window.as_secs();
        let now = Utc::now().timestamp().max(0) as u64;
        let index = now / window_secs;
        let key = format!("ratelimit:{}:{}", subject, index);

        let count = self.store.hit(&key, self.window).await?;
        if count > self.requests_per_window {
            let retry_after_secs = (index + 1) * window_secs - now;
            warn!(%subject, count, "rate limit exceeded");
            return Err(AppError::RateLimited { retry_after_secs });
        }
        Ok(())
    }
}
