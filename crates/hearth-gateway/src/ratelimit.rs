//! Sliding-window rate limiter, one window per session id or client IP.

use std::time::{Duration, Instant};

use dashmap::DashMap;

const WINDOW: Duration = Duration::from_secs(60);

/// Tracks request timestamps per caller. Over-limit callers are
/// rejected with 429 at the gateway; there is no queueing.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `key` and report whether it is within
    /// `limit` requests per minute.
    pub fn allow(&self, key: &str, limit: u32) -> bool {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() >= limit as usize {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drop windows with no recent activity. Called opportunistically
    /// so the map doesn't grow with one-shot callers.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, times| times.iter().any(|t| now.duration_since(*t) < WINDOW));
    }
}
