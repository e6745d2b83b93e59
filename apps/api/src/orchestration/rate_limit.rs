use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{EngineError, EngineResult};

/// Throttles callers per `(workspace, user)`
pub trait RateLimiter: Send + Sync {
    fn check(&self, workspace_id: Uuid, user_id: Uuid) -> EngineResult<()>;
}

/// Allows `limit` calls per key within each fixed window
pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<(Uuid, Uuid), (Instant, u32)>>,
}

impl FixedWindowRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check(&self, workspace_id: Uuid, user_id: Uuid) -> EngineResult<()> {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            tracing::warn!("rate limiter lock poisoned, allowing request");
            return Ok(());
        };

        windows.retain(|_, (started, _)| now.duration_since(*started) < self.window);
        let entry = windows.entry((workspace_id, user_id)).or_insert((now, 0));

        if entry.1 >= self.limit {
            let remaining = self.window.saturating_sub(now.duration_since(entry.0));
            return Err(EngineError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        entry.1 += 1;
        Ok(())
    }
}
