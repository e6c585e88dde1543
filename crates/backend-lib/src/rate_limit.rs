// ============================
// crates/backend-lib/src/rate_limit.rs
// ============================
//! Admission control: sliding-window call throttling per
//! (method, room segment, caller) tuple, backed by the shared
//! store's ordered-set operations so every server instance sees the
//! same window.

use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

use crate::config::RateLimitSettings;
use crate::metrics as keys;
use crate::store::SharedStore;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied,
}

/// Sliding-window rate limiter keyed `rl:{method}:{room}:{caller}`.
///
/// Each call inserts its timestamp into the tuple's ordered set,
/// drops entries older than the window, and counts what remains. The
/// key's TTL is refreshed to slightly more than the window so
/// abandoned tuples self-expire. If the store is unreachable the
/// limiter fails open: an infrastructure outage must not block
/// gameplay.
pub struct SlidingWindowLimiter {
    store: Arc<dyn SharedStore>,
    max_calls: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn SharedStore>, settings: &RateLimitSettings) -> Self {
        Self {
            store,
            max_calls: settings.max_calls,
            window: Duration::from_millis(settings.window_ms),
        }
    }

    fn key(method: &str, room_segment: &str, caller: &str) -> String {
        format!("rl:{method}:{room_segment}:{caller}")
    }

    /// Admit or deny one call for the tuple.
    pub async fn admit(&self, method: &str, room_segment: &str, caller: &str) -> Admission {
        let key = Self::key(method, room_segment, caller);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as f64;
        let window_start = now_ms - self.window.as_millis() as f64;

        // Member must be unique per call; two calls can share a
        // millisecond.
        let member = format!("{now_ms}-{}", Uuid::new_v4());

        let result: Result<usize, crate::store::StoreError> = async {
            self.store.zadd(&key, member, now_ms).await?;
            self.store.zremrangebyscore(&key, 0.0, window_start).await?;
            let count = self.store.zcard(&key).await?;
            self.store
                .expire(&key, self.window + Duration::from_secs(1))
                .await?;
            Ok(count)
        }
        .await;

        match result {
            Ok(count) if count > self.max_calls => {
                counter!(keys::RATE_LIMIT_DENIED).increment(1);
                Admission::Denied
            },
            Ok(_) => Admission::Allowed,
            Err(e) => {
                // Fail open: never let a store outage block gameplay.
                counter!(keys::STORE_UNAVAILABLE).increment(1);
                warn!(%key, error = %e, "rate limiter store error, admitting call");
                Admission::Allowed
            },
        }
    }
}
