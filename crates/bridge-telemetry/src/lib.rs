//! # bridge-telemetry
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`] seeded
//! from settings (overridden by `RUST_LOG`) feeding a `fmt` layer that
//! writes JSON lines or human-readable output to stdout.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `info` or `info,bridge_server=debug`).
    pub level: String,
    /// Emit JSON lines instead of pretty output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured level was not a valid filter directive.
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Parse a filter directive without consulting `RUST_LOG`.
pub fn parse_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&config.level)?,
    };

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let pretty_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}
