//! Server configuration.

use bridge_core::protocol::AdvertisedConfig;
use bridge_settings::BridgeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the bridge server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Advisory connection limit.
    pub max_connections: usize,
    /// Interval between transport ping frames, in seconds.
    pub ping_interval_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_size: usize,
    /// Per-session event history capacity.
    pub event_buffer_size: usize,
    /// Global event log capacity.
    pub global_log_size: usize,
    /// Idle time before the sweeper removes a session, in seconds.
    pub session_timeout_secs: u64,
    /// Sweeper period, in seconds.
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    /// The subset of settings sent to clients in `HANDSHAKE_ACK`.
    pub fn advertised(&self) -> AdvertisedConfig {
        AdvertisedConfig {
            event_buffer_size: self.event_buffer_size,
            session_timeout_secs: self.session_timeout_secs,
            max_connections: self.max_connections,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 100,
            ping_interval_secs: 30,
            max_message_size: 1024 * 1024,
            send_queue_size: 256,
            event_buffer_size: 1000,
            global_log_size: 2000,
            session_timeout_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl From<&BridgeSettings> for ServerConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            ping_interval_secs: settings.server.ping_interval_secs,
            max_message_size: settings.server.max_message_size,
            send_queue_size: settings.server.send_queue_size,
            event_buffer_size: settings.sessions.event_buffer_size,
            global_log_size: settings.sessions.global_log_capacity(),
            session_timeout_secs: settings.sessions.idle_timeout_secs,
            sweep_interval_secs: settings.sessions.sweep_interval_secs,
        }
    }
}
