//! # bridge-core
//!
//! Wire protocol and session value types shared by the sync bridge crates.
//!
//! - [`ids`]: branded string identifiers for sessions and connections
//! - [`protocol`]: push-channel message envelopes (inbound and outbound)
//! - [`session`]: session status, stored events, summaries and snapshots
//! - [`errors`]: recoverable bridge errors

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;
pub mod session;

pub use errors::{BridgeError, ProtocolError};
pub use ids::{ConnectionId, SessionId};

/// Current wall-clock time as Unix epoch milliseconds.
///
/// Every timestamp on the wire uses this representation.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
