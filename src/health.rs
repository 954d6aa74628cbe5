//! # Endpoint Health Tracker
//! Rolling per-endpoint quality metrics: exponentially-weighted success
//! rate and latency, plus last-success/last-failure bookkeeping. This is
//! a monitoring component only; it never blocks, denies, or retries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Each new observation shifts the running averages 10% toward itself.
const EWMA_ALPHA: f32 = 0.1;

#[derive(Debug, Clone, Serialize)]
pub struct FailureStamp {
    pub at_unix: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealth {
    /// Weighted success rate in `[0, 100]`.
    pub success_rate: f32,
    /// Weighted average response time in milliseconds.
    pub avg_response_ms: f32,
    pub last_success_unix: Option<u64>,
    pub last_failure: Option<FailureStamp>,
}

#[derive(Debug)]
pub struct HealthTracker {
    inner: Mutex<HashMap<String, EndpointHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, endpoint_id: &str, elapsed_ms: u64) {
        self.record(endpoint_id, true, elapsed_ms, None);
    }

    pub fn record_failure(&self, endpoint_id: &str, elapsed_ms: u64, message: &str) {
        self.record(endpoint_id, false, elapsed_ms, Some(message));
    }

    fn record(&self, endpoint_id: &str, success: bool, elapsed_ms: u64, message: Option<&str>) {
        let now = now_unix();
        let mut map = self.inner.lock().expect("health tracker mutex poisoned");

        let entry = map.entry(endpoint_id.to_string()).or_insert(EndpointHealth {
            // First observation seeds the averages directly.
            success_rate: if success { 100.0 } else { 0.0 },
            avg_response_ms: elapsed_ms as f32,
            last_success_unix: None,
            last_failure: None,
        });

        let target = if success { 100.0 } else { 0.0 };
        entry.success_rate += EWMA_ALPHA * (target - entry.success_rate);
        entry.success_rate = entry.success_rate.clamp(0.0, 100.0);
        entry.avg_response_ms += EWMA_ALPHA * (elapsed_ms as f32 - entry.avg_response_ms);

        if success {
            entry.last_success_unix = Some(now);
        } else {
            entry.last_failure = Some(FailureStamp {
                at_unix: now,
                message: message.unwrap_or_default().to_string(),
            });
        }
    }

    pub fn snapshot(&self, endpoint_id: &str) -> Option<EndpointHealth> {
        self.inner
            .lock()
            .expect("health tracker mutex poisoned")
            .get(endpoint_id)
            .cloned()
    }

    pub fn snapshot_all(&self) -> HashMap<String, EndpointHealth> {
        self.inner
            .lock()
            .expect("health tracker mutex poisoned")
            .clone()
    }

    /// Operator action; nothing in the pipeline resets health on its own.
    pub fn reset(&self, endpoint_id: &str) {
        self.inner
            .lock()
            .expect("health tracker mutex poisoned")
            .remove(endpoint_id);
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
