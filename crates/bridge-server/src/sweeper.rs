//! Background expiry of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::now_millis;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::SessionStore;

/// Start a background task that removes sessions idle for longer than
/// `idle_timeout`, checking every `interval`.
///
/// The task exits when `cancel` fires. Connections still attached to an
/// expired session stay open; their session-bound messages get `ERROR`.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let idle_timeout_ms = i64::try_from(idle_timeout.as_millis()).unwrap_or(i64::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = store.sweep_expired(now_millis(), idle_timeout_ms);
                    if !expired.is_empty() {
                        info!(removed = expired.len(), remaining = store.session_count(), "expired idle sessions");
                    }
                }
            }
        }
        debug!("session sweeper stopped");
    })
}
