//! Bridge error types.
//!
//! Every variant here is recoverable: it is reported to the caller that
//! triggered it (a single message, connection or API call) and never
//! terminates the hub.

use thiserror::Error;

use crate::ids::SessionId;

/// Errors raised while operating on the session store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// No session exists under the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// A required message or request field was absent or null.
    #[error("{0}")]
    MissingField(&'static str),

    /// A field was present but had the wrong shape.
    #[error("{0}")]
    InvalidField(&'static str),

    /// Unexpected failure while handling one message or request.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Error returned when an `EVENT` message or API push has no event.
    pub const EVENT_REQUIRED: Self = Self::MissingField("Event is required");
    /// Error returned when `METRICS_UPDATE` carries no metrics.
    pub const METRICS_REQUIRED: Self = Self::MissingField("Metrics are required");
    /// Error returned when `CONFIG_UPDATE` carries no config.
    pub const CONFIG_REQUIRED: Self = Self::MissingField("Config is required");
    /// Error returned when `SYNC_CONTROL` carries no action.
    pub const ACTION_REQUIRED: Self = Self::MissingField("Action is required");

    /// Short machine-readable code for API bodies and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidField(_) => "INVALID_FIELD",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Push-channel protocol violations. Each one closes the offending
/// connection with [`ProtocolError::close_code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The text frame was not a JSON object with a string `type`.
    #[error("Invalid message format")]
    Malformed,

    /// A non-handshake message arrived before the handshake.
    #[error("Handshake required")]
    HandshakeRequired,

    /// The handshake itself could not be understood (e.g. unknown role).
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),
}

impl ProtocolError {
    /// WebSocket close code sent with the close frame.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::HandshakeRequired => crate::protocol::CLOSE_HANDSHAKE_REQUIRED,
            Self::Malformed => crate::protocol::CLOSE_INVALID_MESSAGE,
            Self::InvalidHandshake(_) => crate::protocol::CLOSE_INVALID_HANDSHAKE,
        }
    }
}
