//! Client-side rate limiting for Megaphone calls.

use std::collections::VecDeque;
use std::time::Duration;

use adsync_core::config::RateLimitConfig;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Sliding-window limiter: at most `max_calls` acquisitions in any `window`.
///
/// [`acquire`](RateLimiter::acquire) waits for a free slot instead of
/// failing.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    /// Start times of the calls still inside the window, oldest first.
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_calls` is clamped to at least 1.
    #[must_use]
    pub fn new(max_calls: u32, window: Duration) -> Self {
        let max_calls = max_calls.max(1) as usize;
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, config.window())
    }

    /// Takes a slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        self.evict_expired(&mut calls, now);
        if calls.len() < self.max_calls {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Takes a slot, waiting until the oldest call leaves the window if needed.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                self.evict_expired(&mut calls, now);
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            sleep(wait).await;
        }
    }

    /// Calls currently counted against the window.
    pub async fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        self.evict_expired(&mut calls, Instant::now());
        calls.len()
    }

    fn evict_expired(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}
