//! Per-user admission counters over a fixed window.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub user_id: String,
    pub request_count: u32,
    pub window_start: u64,
    pub is_limited: bool,
}

impl RateLimitInfo {
    fn new(user_id: &str, now: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            request_count: 0,
            window_start: now,
            is_limited: false,
        }
    }

    fn roll_window(&mut self, now: u64, window_ms: u64) {
        if now.saturating_sub(self.window_start) > window_ms {
            self.request_count = 0;
            self.window_start = now;
            self.is_limited = false;
        }
    }
}

#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateLimitInfo>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// True if `user_id` already used up its window. Starts a fresh window if the old one expired.
    pub fn is_limited(&self, user_id: &str, now: u64, window_ms: u64, max_requests: u32) -> bool {
        match self.windows.get_mut(user_id) {
            Some(mut info) => {
                info.roll_window(now, window_ms);
                info.request_count >= max_requests
            }
            None => false,
        }
    }

    /// Counts one admission for `user_id`.
    pub fn record(&self, user_id: &str, now: u64, window_ms: u64, max_requests: u32) {
        let mut info = self.windows
            .entry(user_id.to_string())
            .or_insert_with(|| RateLimitInfo::new(user_id, now));

        info.roll_window(now, window_ms);
        info.request_count += 1;
        info.is_limited = info.request_count >= max_requests;
    }

    pub fn info(&self, user_id: &str) -> Option<RateLimitInfo> {
        self.windows.get(user_id).map(|info| info.value().clone())
    }

    /// Drops windows that have expired. Returns how many were removed.
    pub fn prune_expired(&self, now: u64, window_ms: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, info| now.saturating_sub(info.window_start) <= window_ms);
        before.saturating_sub(self.windows.len())
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }
}
