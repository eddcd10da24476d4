//! Session mutations shared by the push channel and the request API.
//!
//! Each operation validates its input, then mutates the session and fans
//! the resulting broadcast out while holding the session lock, so that
//! broadcasts for one session leave in the order the mutations happened.
//! A session the store has dropped is reported as not found, even when the
//! caller still holds its handle.

use bridge_core::protocol::{ClientRole, OutboundMessage, SyncAction};
use bridge_core::session::{GlobalLogEntry, SessionStatus, StoredEvent};
use bridge_core::{BridgeError, now_millis};
use metrics::counter;
use parking_lot::MutexGuard;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::metrics::EVENTS_INGESTED_TOTAL;
use crate::store::session::Session;
use crate::store::{SessionHandle, SessionStore};
use crate::websocket::broadcast::fan_out;

/// Append an event to the session and the global log, then broadcast
/// `EVENT_BROADCAST`. Returns the session's retained event count.
pub fn ingest_event(
    store: &SessionStore,
    session: &SessionHandle,
    event: Option<Value>,
    source_role: ClientRole,
) -> Result<usize, BridgeError> {
    let raw = event.ok_or(BridgeError::EVENT_REQUIRED)?;
    let now = now_millis();

    let mut guard = lock_live(session)?;
    guard.touch(now);
    let stored = StoredEvent::enrich(guard.id().clone(), raw, now);
    let event_count = guard.push_event(stored.clone());
    store.global_log().append(GlobalLogEntry {
        session_id: guard.id().clone(),
        event: stored.clone(),
        timestamp: now,
    });
    counter!(EVENTS_INGESTED_TOTAL, "source" => source_role.as_str()).increment(1);
    debug!(
        session_id = %guard.id(),
        event_type = stored.event_type().unwrap_or("-"),
        event_count,
        "event ingested"
    );

    let message = OutboundMessage::EventBroadcast {
        event: stored,
        source_role,
        timestamp: now,
    };
    let _ = fan_out(&guard.recipients(), &message);
    Ok(event_count)
}

/// Merge a partial metrics map and broadcast the merged result.
pub fn update_metrics(
    session: &SessionHandle,
    metrics: Option<Value>,
) -> Result<Map<String, Value>, BridgeError> {
    let partial = require_object(
        metrics,
        BridgeError::METRICS_REQUIRED,
        BridgeError::InvalidField("Metrics must be an object"),
    )?;
    let now = now_millis();

    let mut guard = lock_live(session)?;
    guard.touch(now);
    let merged = guard.merge_metrics(partial);
    let message = OutboundMessage::MetricsUpdateBroadcast {
        metrics: merged.clone(),
        timestamp: now,
    };
    let _ = fan_out(&guard.recipients(), &message);
    Ok(merged)
}

/// Merge a partial config map and broadcast the merged result.
pub fn update_config(
    session: &SessionHandle,
    config: Option<Value>,
) -> Result<Map<String, Value>, BridgeError> {
    let partial = require_object(
        config,
        BridgeError::CONFIG_REQUIRED,
        BridgeError::InvalidField("Config must be an object"),
    )?;
    let now = now_millis();

    let mut guard = lock_live(session)?;
    guard.touch(now);
    let merged = guard.merge_config(partial);
    let message = OutboundMessage::ConfigUpdateBroadcast {
        config: merged.clone(),
        timestamp: now,
    };
    let _ = fan_out(&guard.recipients(), &message);
    Ok(merged)
}

/// Apply a control action and broadcast it.
///
/// Recognised actions move the session status. Unrecognised actions leave
/// the status alone but are still broadcast. Returns the new status, if
/// any.
pub fn sync_control(
    session: &SessionHandle,
    action: Option<String>,
    params: Value,
) -> Result<Option<SessionStatus>, BridgeError> {
    let action = action.ok_or(BridgeError::ACTION_REQUIRED)?;
    let now = now_millis();

    let mut guard = lock_live(session)?;
    guard.touch(now);
    let status = SyncAction::parse(&action).map(SyncAction::target_status);
    match status {
        Some(status) => {
            guard.set_status(status);
            debug!(session_id = %guard.id(), action = %action, status = status.as_str(), "sync control applied");
        }
        None => {
            warn!(session_id = %guard.id(), action = %action, "unrecognised sync control action, broadcasting as-is");
        }
    }
    let message = OutboundMessage::SyncControlBroadcast {
        action,
        params,
        timestamp: now,
    };
    let _ = fan_out(&guard.recipients(), &message);
    Ok(status)
}

/// Lock `session`, refusing one the store has already dropped.
fn lock_live(session: &SessionHandle) -> Result<MutexGuard<'_, Session>, BridgeError> {
    let guard = session.lock();
    if guard.is_removed() {
        return Err(BridgeError::SessionNotFound(guard.id().clone()));
    }
    Ok(guard)
}

fn require_object(
    value: Option<Value>,
    missing: BridgeError,
    invalid: BridgeError,
) -> Result<Map<String, Value>, BridgeError> {
    match value {
        None => Err(missing),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(invalid),
    }
}
