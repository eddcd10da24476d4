//! Push-channel message envelopes.
//!
//! Every frame is one JSON object with a string `type` discriminator.
//! Inbound frames are parsed into [`InboundMessage`]; types the hub does not
//! know are preserved as [`InboundMessage::Unknown`] so the router can log
//! and ignore them. Outbound frames are [`OutboundMessage`] values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::ids::{ConnectionId, SessionId};
use crate::now_millis;
use crate::session::{SessionState, SessionStatus, StoredEvent};

/// Close code: first message on a connection was not `HANDSHAKE`.
pub const CLOSE_HANDSHAKE_REQUIRED: u16 = 4001;
/// Close code: frame was not a JSON object with a string `type`.
pub const CLOSE_INVALID_MESSAGE: u16 = 4002;
/// Close code: `HANDSHAKE` could not be understood.
pub const CLOSE_INVALID_HANDSHAKE: u16 = 4003;
/// Close code: the hub is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Role a client declares in its handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// The authoritative event source (CLI / agent process).
    Producer,
    /// A dashboard receiving broadcasts.
    Subscriber,
}

impl ClientRole {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Subscriber => "subscriber",
        }
    }
}

/// Recognised `SYNC_CONTROL` actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// `PAUSE` → [`SessionStatus::Paused`].
    Pause,
    /// `RESUME` → [`SessionStatus::Running`].
    Resume,
    /// `CANCEL` → [`SessionStatus::Cancelled`].
    Cancel,
}

impl SyncAction {
    /// Parse a wire action name. Unrecognised names yield `None`.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "PAUSE" => Some(Self::Pause),
            "RESUME" => Some(Self::Resume),
            "CANCEL" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Session status this action moves the session to.
    pub fn target_status(self) -> SessionStatus {
        match self {
            Self::Pause => SessionStatus::Paused,
            Self::Resume => SessionStatus::Running,
            Self::Cancel => SessionStatus::Cancelled,
        }
    }
}

/// Payload of a `HANDSHAKE` message.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Session to join; a new session is created when absent or unknown.
    #[serde(default, alias = "session_id")]
    pub session_id: Option<SessionId>,
    /// Free-form client label, echoed in `CLIENT_CONNECTED`.
    #[serde(default, alias = "client_name")]
    pub client_name: Option<String>,
    /// Declared role.
    pub role: ClientRole,
}

/// A parsed inbound push-channel message.
///
/// Payload fields are kept as optional raw JSON; presence and shape are
/// validated by the router so it can answer with a sender-only `ERROR`.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// `HANDSHAKE{sessionId?, clientName, role}`.
    Handshake(Handshake),
    /// `EVENT{event}`.
    Event {
        /// Caller-supplied event; `None` when absent or null.
        event: Option<Value>,
    },
    /// `METRICS_UPDATE{metrics}`.
    MetricsUpdate {
        /// Partial metrics map; `None` when absent or null.
        metrics: Option<Value>,
    },
    /// `CONFIG_UPDATE{config}`.
    ConfigUpdate {
        /// Partial config map; `None` when absent or null.
        config: Option<Value>,
    },
    /// `SYNC_CONTROL{action, params?}`.
    SyncControl {
        /// Action name; `None` when absent or not a string.
        action: Option<String>,
        /// Optional parameters, `null` when absent.
        params: Value,
    },
    /// `PING`.
    Ping,
    /// `GET_STATE`.
    GetState,
    /// Any other `type`, kept verbatim.
    Unknown {
        /// The unrecognised `type` value.
        kind: String,
        /// The whole frame.
        raw: Value,
    },
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::Malformed)?;
        Self::from_value(value)
    }

    /// Interpret an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::Malformed);
        };
        let kind = match obj.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(ProtocolError::Malformed),
        };

        let message = match kind.as_str() {
            "HANDSHAKE" => {
                let mut handshake: Handshake = serde_json::from_value(Value::Object(obj))
                    .map_err(|e| ProtocolError::InvalidHandshake(e.to_string()))?;
                if handshake
                    .session_id
                    .as_ref()
                    .is_some_and(|id| id.as_str().trim().is_empty())
                {
                    handshake.session_id = None;
                }
                Self::Handshake(handshake)
            }
            "EVENT" => Self::Event {
                event: take_present(&mut obj, "event"),
            },
            "METRICS_UPDATE" => Self::MetricsUpdate {
                metrics: take_present(&mut obj, "metrics"),
            },
            "CONFIG_UPDATE" => Self::ConfigUpdate {
                config: take_present(&mut obj, "config"),
            },
            "SYNC_CONTROL" => Self::SyncControl {
                action: match take_present(&mut obj, "action") {
                    Some(Value::String(action)) => Some(action),
                    _ => None,
                },
                params: take_present(&mut obj, "params").unwrap_or(Value::Null),
            },
            "PING" => Self::Ping,
            "GET_STATE" => Self::GetState,
            _ => Self::Unknown {
                kind,
                raw: Value::Object(obj),
            },
        };
        Ok(message)
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &str {
        match self {
            Self::Handshake(_) => "HANDSHAKE",
            Self::Event { .. } => "EVENT",
            Self::MetricsUpdate { .. } => "METRICS_UPDATE",
            Self::ConfigUpdate { .. } => "CONFIG_UPDATE",
            Self::SyncControl { .. } => "SYNC_CONTROL",
            Self::Ping => "PING",
            Self::GetState => "GET_STATE",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Remove a field, treating JSON `null` as absent.
fn take_present(obj: &mut Map<String, Value>, name: &str) -> Option<Value> {
    obj.remove(name).filter(|v| !v.is_null())
}

/// Server settings advertised to clients in `HANDSHAKE_ACK`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisedConfig {
    /// Per-session event history capacity.
    pub event_buffer_size: usize,
    /// Idle timeout after which a session is reclaimed, in seconds.
    pub session_timeout_secs: u64,
    /// Advisory connection limit.
    pub max_connections: usize,
}

/// An outbound push-channel message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum OutboundMessage {
    /// Reply to a successful handshake.
    HandshakeAck {
        /// Session the connection is attached to.
        session_id: SessionId,
        /// Id assigned to this connection.
        connection_id: ConnectionId,
        /// Role the connection attached with.
        role: ClientRole,
        /// Hub settings relevant to clients.
        config: AdvertisedConfig,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// A connection attached to the session.
    ClientConnected {
        /// Role of the new connection.
        role: ClientRole,
        /// Id of the new connection.
        connection_id: ConnectionId,
        /// Client label from its handshake.
        client_name: String,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// A connection left the session.
    ClientDisconnected {
        /// Role the connection had.
        role: ClientRole,
        /// Id of the departed connection.
        connection_id: ConnectionId,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// An event was ingested into the session.
    EventBroadcast {
        /// The stored, enriched event.
        event: StoredEvent,
        /// Role of the sender.
        source_role: ClientRole,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Session metrics changed; carries the merged map.
    MetricsUpdateBroadcast {
        /// Merged metrics, including `updatedAt`.
        metrics: Map<String, Value>,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Session config changed; carries the merged map.
    ConfigUpdateBroadcast {
        /// Merged config, including `updatedAt`.
        config: Map<String, Value>,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// A control action was issued.
    SyncControlBroadcast {
        /// Action name exactly as received.
        action: String,
        /// Parameters as received (`null` when absent).
        params: Value,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Reply to `PING`.
    Pong {
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Reply to `GET_STATE`.
    StateSnapshot {
        /// Full session state.
        state: SessionState,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Sender-only error report.
    Error {
        /// Human-readable description.
        message: String,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// Build an `ERROR` stamped with the current time.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now_millis(),
        }
    }

    /// Build a `PONG` stamped with the current time.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: now_millis(),
        }
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeAck { .. } => "HANDSHAKE_ACK",
            Self::ClientConnected { .. } => "CLIENT_CONNECTED",
            Self::ClientDisconnected { .. } => "CLIENT_DISCONNECTED",
            Self::EventBroadcast { .. } => "EVENT_BROADCAST",
            Self::MetricsUpdateBroadcast { .. } => "METRICS_UPDATE_BROADCAST",
            Self::ConfigUpdateBroadcast { .. } => "CONFIG_UPDATE_BROADCAST",
            Self::SyncControlBroadcast { .. } => "SYNC_CONTROL_BROADCAST",
            Self::Pong { .. } => "PONG",
            Self::StateSnapshot { .. } => "STATE_SNAPSHOT",
            Self::Error { .. } => "ERROR",
        }
    }
}
