//! Best-effort fan-out of one outbound message to a set of connections.

use std::sync::Arc;

use bridge_core::protocol::OutboundMessage;
use metrics::counter;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_DROPS_TOTAL};

/// Outcome of a single fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients the frame was queued for.
    pub delivered: usize,
    /// Recipients skipped (closed, or queue full).
    pub skipped: usize,
}

/// Deliver `message` to every open recipient.
///
/// The message is serialized once. A recipient that is closed or whose
/// queue is full is skipped; delivery to the others continues. Never blocks.
pub fn fan_out(recipients: &[Arc<ClientConnection>], message: &OutboundMessage) -> DeliveryReport {
    let json = match serde_json::to_string(message) {
        Ok(j) => Arc::new(j),
        Err(e) => {
            warn!(message_type = message.kind(), error = %e, "failed to serialize broadcast");
            return DeliveryReport {
                delivered: 0,
                skipped: recipients.len(),
            };
        }
    };

    let mut report = DeliveryReport::default();
    for conn in recipients {
        if conn.send(Arc::clone(&json)) {
            report.delivered += 1;
        } else {
            report.skipped += 1;
            warn!(conn_id = %conn.id, message_type = message.kind(), "skipped broadcast recipient");
        }
    }

    counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
    if report.skipped > 0 {
        counter!(BROADCAST_DROPS_TOTAL).increment(report.skipped as u64);
    }
    debug!(
        message_type = message.kind(),
        delivered = report.delivered,
        skipped = report.skipped,
        "broadcast"
    );
    report
}
