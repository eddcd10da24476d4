//! Session value types: status, stored events, summaries and snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::SessionId;

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no producer has attached yet.
    Initialized,
    /// A producer is attached.
    Connected,
    /// The producer went away.
    Disconnected,
    /// Paused by a `SYNC_CONTROL` `PAUSE`.
    Paused,
    /// Resumed by a `SYNC_CONTROL` `RESUME`.
    Running,
    /// Cancelled by a `SYNC_CONTROL` `CANCEL`.
    Cancelled,
}

impl SessionStatus {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Paused => "paused",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
        }
    }
}

/// An event as retained in session history and the global log.
///
/// The caller-supplied object is kept as-is and enriched with the owning
/// session id and ingestion time. Stored events are never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Caller-supplied fields (`type`, payload, ...).
    #[serde(flatten)]
    pub body: Map<String, Value>,
    /// Session the event was ingested into.
    pub session_id: SessionId,
    /// Ingestion time, epoch milliseconds.
    pub added_at: i64,
}

impl StoredEvent {
    /// Enrich a raw event for storage.
    ///
    /// Non-object events are wrapped as `{"payload": <value>}`. Any
    /// client-supplied `sessionId` / `addedAt` keys are replaced.
    pub fn enrich(session_id: SessionId, raw: Value, added_at: i64) -> Self {
        let mut body = match raw {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                let _ = map.insert("payload".into(), other);
                map
            }
        };
        let _ = body.remove("sessionId");
        let _ = body.remove("addedAt");
        Self {
            body,
            session_id,
            added_at,
        }
    }

    /// The caller-supplied `type`, if it is a string.
    pub fn event_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }
}

/// Point-in-time summary of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last inbound activity, epoch milliseconds.
    pub last_activity_at: i64,
    /// Current status.
    pub status: SessionStatus,
    /// Whether a producer connection is attached.
    pub producer_connected: bool,
    /// Number of live subscriber connections.
    pub subscriber_count: usize,
    /// Events currently retained in history.
    pub event_count: usize,
    /// Events ever ingested, including evicted ones.
    pub total_events: u64,
}

/// Full session state, as returned by `GET_STATE` and the session API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Session id.
    pub session_id: SessionId,
    /// Current status.
    pub status: SessionStatus,
    /// Accumulated metrics map.
    pub metrics: Map<String, Value>,
    /// Accumulated config map.
    pub config: Map<String, Value>,
    /// Retained event history, oldest first.
    pub events: Vec<StoredEvent>,
    /// Events ever ingested, including evicted ones.
    pub total_events: u64,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last inbound activity, epoch milliseconds.
    pub last_activity_at: i64,
}

/// One entry of the process-wide event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLogEntry {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// The stored event.
    pub event: StoredEvent,
    /// When the entry was appended, epoch milliseconds.
    pub timestamp: i64,
}
