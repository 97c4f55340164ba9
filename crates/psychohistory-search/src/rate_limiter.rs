use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Extra wait added when sleeping until the oldest timestamp leaves the
/// window, so the re-check lands strictly after expiry.
const EXPIRY_SLACK: Duration = Duration::from_millis(10);

/// Sliding-window rate limiter: at most `limit` permits in any `window`.
///
/// Permit acquisition is serialized behind a single mutex. Each pass prunes
/// timestamps that fell out of the window before checking capacity; a permit
/// is consumed by appending the current timestamp at release. Callers at
/// capacity sleep until the oldest timestamp expires, then re-check.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        assert!(limit > 0, "rate limit must be at least 1");
        Self {
            limit,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Wait until a permit is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = stamps.front() {
                    if now.duration_since(oldest) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }
                if stamps.len() < self.limit {
                    stamps.push_back(now);
                    return;
                }
                // Full window: the front entry is the next to expire.
                *stamps.front().expect("window is full") + self.window + EXPIRY_SLACK
            };
            tokio::time::sleep_until(wake_at).await;
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
