// src/ratelimit.rs
//! Per-endpoint windowed request accounting. Windows reset lazily on
//! check; there are no background timers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::RateQuota;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at_ms: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Permit a request for `endpoint_id` if the current window still has
    /// quota, counting the request when permitted.
    pub fn check(&self, endpoint_id: &str, quota: &RateQuota) -> bool {
        self.check_at(endpoint_id, quota, now_ms())
    }

    fn check_at(&self, endpoint_id: &str, quota: &RateQuota, now: u64) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");

        let window = windows.entry(endpoint_id.to_string()).or_insert(RateWindow {
            count: 0,
            reset_at_ms: now + quota.period().as_millis() as u64,
        });

        if now > window.reset_at_ms {
            window.count = 0;
            window.reset_at_ms = now + quota.period().as_millis() as u64;
        }

        if window.count < quota.count {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Remaining quota in the current window, for diagnostics.
    pub fn remaining(&self, endpoint_id: &str, quota: &RateQuota) -> u32 {
        let now = now_ms();
        let windows = self.windows.lock().expect("rate limiter mutex poisoned");
        match windows.get(endpoint_id) {
            Some(w) if now <= w.reset_at_ms => quota.count.saturating_sub(w.count),
            _ => quota.count,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
