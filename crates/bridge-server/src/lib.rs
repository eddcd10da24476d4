//! # bridge-server
//!
//! Real-time event relay hub: producers push events into sessions and every
//! connection attached to the session receives them.
//!
//! - [`store`]: sessions with bounded event history, plus the global event log
//! - [`websocket`]: push channel transport, message routing and fan-out
//! - [`relay`]: session mutations shared by the push channel and the API
//! - [`api`]: JSON request API over HTTP
//! - [`sweeper`]: expiry of idle sessions
//! - Health check, Prometheus metrics and graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod sweeper;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, BridgeServer};
