//! クライアントキー（IP アドレス）ごとの固定ウィンドウ型レート制限。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;

use crate::infrastructure::clock::Clock;

/// 追跡するクライアントキーの最大数。
const MAX_TRACKED_KEYS: u64 = 100_000;

/// RateDecision は 1 リクエスト分の判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after_secs: u64 },
}

struct Window {
    started_at: DateTime<Utc>,
    count: AtomicU32,
}

impl Window {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            count: AtomicU32::new(0),
        }
    }
}

/// FixedWindowRateLimiter はキーごとにウィンドウ内のリクエスト数を数える。
///
/// 一定時間アクセスの無いキーは moka によって破棄される。
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: chrono::Duration,
    windows: Cache<String, Arc<Window>>,
    clock: Arc<dyn Clock>,
}

impl FixedWindowRateLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let windows = Cache::builder()
            .max_capacity(MAX_TRACKED_KEYS)
            .time_to_idle(window)
            .build();
        Self {
            max_requests,
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
            windows,
            clock,
        }
    }

    /// リクエストを 1 件数え、上限内かどうかを返す。
    pub async fn check(&self, key: &str) -> RateDecision {
        let now = self.clock.now();
        let mut window = self
            .windows
            .get_with(key.to_string(), async { Arc::new(Window::new(now)) })
            .await;

        if now - window.started_at >= self.window {
            window = Arc::new(Window::new(now));
            self.windows.insert(key.to_string(), window.clone()).await;
        }

        let used = window.count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if used > self.max_requests {
            let reset_in = window
                .started_at
                .checked_add_signed(self.window)
                .map_or(0, |reset_at| (reset_at - now).num_seconds());
            RateDecision::Limited {
                limit: self.max_requests,
                retry_after_secs: u64::try_from(reset_in).unwrap_or(0).max(1),
            }
        } else {
            RateDecision::Allowed {
                limit: self.max_requests,
                remaining: self.max_requests - used,
            }
        }
    }
}
