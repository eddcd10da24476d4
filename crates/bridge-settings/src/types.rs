//! Settings structures. All keys are camelCase in JSON and every section
//! falls back to its defaults for missing fields.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Session store sizing and expiry.
    pub sessions: SessionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port for the HTTP API and the `/ws` push channel.
    pub port: u16,
    /// Advisory connection limit; exceeding it only logs a warning.
    pub max_connections: usize,
    /// Interval between transport-level WebSocket pings, in seconds.
    pub ping_interval_secs: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_connections: 100,
            ping_interval_secs: 30,
            max_message_size: 1024 * 1024,
            send_queue_size: 256,
        }
    }
}

/// Session store sizing and expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Per-session event history capacity.
    pub event_buffer_size: usize,
    /// Global event log capacity; twice `event_buffer_size` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_log_size: Option<usize>,
    /// Idle time after which the sweeper removes a session, in seconds.
    pub idle_timeout_secs: u64,
    /// Sweeper period, in seconds.
    pub sweep_interval_secs: u64,
}

impl SessionSettings {
    /// Effective global log capacity.
    pub fn global_log_capacity(&self) -> usize {
        self.global_log_size
            .unwrap_or_else(|| self.event_buffer_size.saturating_mul(2))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            global_log_size: None,
            idle_timeout_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}
