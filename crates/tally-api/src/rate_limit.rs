use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tally_core::util::user_fingerprint;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Sync routes that carry their own request budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectedEndpoint {
    Sync,
    FirstSync,
}

impl ProtectedEndpoint {
    const COUNT: usize = 2;

    pub const fn label(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::FirstSync => "first_sync",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Sync => 0,
            Self::FirstSync => 1,
        }
    }
}

/// Fixed-window request budget per user and endpoint.
///
/// Windows that have run out are swept at most once per window length, so
/// the table only holds users seen recently.
#[derive(Clone)]
pub struct EndpointRateLimiter {
    windows: Arc<Mutex<WindowTable>>,
    window: Duration,
    limits: [u32; ProtectedEndpoint::COUNT],
    counters: Arc<[EndpointCounters; ProtectedEndpoint::COUNT]>,
}

struct WindowTable {
    entries: HashMap<(ProtectedEndpoint, String), RateWindow>,
    last_sweep: Instant,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

#[derive(Default)]
struct EndpointCounters {
    allowed: AtomicU64,
    limited: AtomicU64,
}

/// Counters reported by `/healthz`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub sync_allowed: u64,
    pub sync_limited: u64,
    pub first_sync_allowed: u64,
    pub first_sync_limited: u64,
    pub tracked_windows: usize,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.sync_rate_limit_per_window,
            config.first_sync_rate_limit_per_window,
        )
    }

    fn new(window: Duration, sync_limit: u32, first_sync_limit: u32) -> Self {
        Self {
            windows: Arc::new(Mutex::new(WindowTable {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            window,
            limits: [sync_limit, first_sync_limit],
            counters: Arc::new(Default::default()),
        }
    }

    /// Spend one request of `user_id`'s budget on `endpoint`
    pub async fn check(&self, endpoint: ProtectedEndpoint, user_id: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut table = self.windows.lock().await;
        if now.duration_since(table.last_sweep) >= self.window {
            self.sweep(&mut table, now);
        }

        let window = table
            .entries
            .entry((endpoint, user_id.to_string()))
            .or_insert(RateWindow {
                started_at: now,
                count: 0,
            });
        if now.duration_since(window.started_at) >= self.window {
            *window = RateWindow {
                started_at: now,
                count: 0,
            };
        }

        let counters = &self.counters[endpoint.index()];
        if window.count >= self.limits[endpoint.index()] {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(window.started_at))
                .as_secs()
                .max(1);
            counters.limited.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                user = user_fingerprint(user_id),
                retry_after_secs,
                "Sync request over budget"
            );
            return Err(AppError::too_many_requests(
                format!("Rate limit exceeded for {}", endpoint.label()),
                retry_after_secs,
            ));
        }

        window.count += 1;
        counters.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        let load = |endpoint: ProtectedEndpoint| {
            let counters = &self.counters[endpoint.index()];
            (
                counters.allowed.load(Ordering::Relaxed),
                counters.limited.load(Ordering::Relaxed),
            )
        };
        let (sync_allowed, sync_limited) = load(ProtectedEndpoint::Sync);
        let (first_sync_allowed, first_sync_limited) = load(ProtectedEndpoint::FirstSync);

        RateLimitMetricsSnapshot {
            sync_allowed,
            sync_limited,
            first_sync_allowed,
            first_sync_limited,
            tracked_windows: self.windows.lock().await.entries.len(),
        }
    }

    fn sweep(&self, table: &mut WindowTable, now: Instant) {
        let before = table.entries.len();
        table
            .entries
            .retain(|_, window| now.duration_since(window.started_at) < self.window);
        table.last_sweep = now;
        tracing::debug!(
            expired = before - table.entries.len(),
            remaining = table.entries.len(),
            "Swept rate limit windows"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2, 2);

        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();

        let err = limiter
            .check(ProtectedEndpoint::Sync, "user-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, retry) if retry >= 1));

        let metrics = limiter.metrics_snapshot().await;
        assert_eq!(metrics.sync_allowed, 2);
        assert_eq!(metrics.sync_limited, 1);
        assert_eq!(metrics.first_sync_allowed, 0);
    }

    #[tokio::test]
    async fn budgets_are_separate_per_endpoint_and_user() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
        limiter
            .check(ProtectedEndpoint::FirstSync, "user-a")
            .await
            .unwrap();
        limiter.check(ProtectedEndpoint::Sync, "user-b").await.unwrap();

        assert!(limiter.check(ProtectedEndpoint::Sync, "user-a").await.is_err());
        assert_eq!(limiter.metrics_snapshot().await.tracked_windows, 3);
    }

    #[tokio::test]
    async fn expired_windows_are_swept() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(50), 1, 1);

        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
        limiter
            .check(ProtectedEndpoint::FirstSync, "user-b")
            .await
            .unwrap();
        assert_eq!(limiter.metrics_snapshot().await.tracked_windows, 2);

        tokio::time::sleep(Duration::from_millis(80)).await;

        limiter.check(ProtectedEndpoint::Sync, "user-c").await.unwrap();
        assert_eq!(limiter.metrics_snapshot().await.tracked_windows, 1);

        // user-a's budget was refreshed along with the sweep
        limiter.check(ProtectedEndpoint::Sync, "user-a").await.unwrap();
    }
}
