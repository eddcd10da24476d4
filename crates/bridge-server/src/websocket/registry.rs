//! Hub-wide registry of live push connections.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::ConnectionId;
use dashmap::DashMap;

use super::connection::ClientConnection;

/// Every open push connection, regardless of session attachment.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns the number of live connections afterwards.
    pub fn add(&self, connection: Arc<ClientConnection>) -> usize {
        let _ = self.connections.insert(connection.id.clone(), connection);
        self.connections.len()
    }

    /// Remove a connection by ID.
    pub fn remove(&self, connection_id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.remove(connection_id).map(|(_, conn)| conn)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Wait until every connection has deregistered, or `timeout` elapses.
    ///
    /// Returns `true` if the registry drained.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let drained = async {
            while !self.connections.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}
