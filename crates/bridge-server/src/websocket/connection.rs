//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bridge_core::ConnectionId;
use bridge_core::protocol::OutboundMessage;
use tokio::sync::mpsc;
use tracing::warn;

/// A frame queued for the connection's write task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized JSON text.
    Text(Arc<String>),
    /// Close the socket with the given code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<OutboundFrame>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Cleared once the connection is closing or closed.
    open: AtomicBool,
    /// Count of messages dropped due to full channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            open: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Whether frames can still be delivered.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Send a text frame to the client without waiting.
    ///
    /// Returns `false` if the connection is closed or its queue is full; a
    /// full queue increments the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(OutboundFrame::Text(message)).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a protocol message and send it to the client.
    pub fn send_message(&self, message: &OutboundMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, message_type = message.kind(), error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Queue a close frame and stop accepting further sends.
    ///
    /// Returns `true` if this call initiated the close and the frame was
    /// queued.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.tx
            .try_send(OutboundFrame::Close {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Mark the connection closed without sending a close frame.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
