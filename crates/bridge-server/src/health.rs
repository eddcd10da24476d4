//! `/health` endpoint.

use std::time::Instant;

use bridge_core::now_millis;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    /// Response time, Unix epoch milliseconds.
    pub timestamp: i64,
    /// Live session count.
    pub sessions: usize,
    /// Open push connection count.
    pub connections: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        timestamp: now_millis(),
        sessions,
        connections,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
