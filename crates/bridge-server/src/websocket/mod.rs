//! Push channel: per-connection transport, routing and broadcast fan-out.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod router;
pub mod session;
