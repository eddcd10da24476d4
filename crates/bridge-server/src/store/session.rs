//! Mutable per-session state.
//!
//! A [`Session`] is always accessed through its store handle's mutex; every
//! method here assumes the caller holds that lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use bridge_core::session::{SessionState, SessionStatus, SessionSummary, StoredEvent};
use bridge_core::{ConnectionId, SessionId};
use serde_json::{Map, Value};

use crate::websocket::connection::ClientConnection;

/// Key stamped into merged metrics / config maps.
pub const UPDATED_AT_KEY: &str = "updatedAt";

/// One relay session: its attached connections and accumulated state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: i64,
    last_activity_at: i64,
    status: SessionStatus,
    producer: Option<Arc<ClientConnection>>,
    subscribers: HashMap<ConnectionId, Weak<ClientConnection>>,
    metrics: Map<String, Value>,
    config: Map<String, Value>,
    events: VecDeque<StoredEvent>,
    capacity: usize,
    total_events: u64,
    removed: bool,
}

impl Session {
    /// Create an empty session in the `initialized` state.
    pub fn new(id: SessionId, capacity: usize, now: i64) -> Self {
        Self {
            id,
            created_at: now,
            last_activity_at: now,
            status: SessionStatus::Initialized,
            producer: None,
            subscribers: HashMap::new(),
            metrics: Map::new(),
            config: Map::new(),
            events: VecDeque::new(),
            capacity: capacity.max(1),
            total_events: 0,
            removed: false,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Last inbound activity, epoch milliseconds.
    pub fn last_activity_at(&self) -> i64 {
        self.last_activity_at
    }

    /// Mark the session as no longer registered in the store.
    pub fn mark_removed(&mut self) {
        self.removed = true;
    }

    /// Whether the store has dropped this session. Mutations must be
    /// refused once this is set.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Record activity. Never moves the timestamp backwards.
    pub fn touch(&mut self, now: i64) {
        self.last_activity_at = self.last_activity_at.max(now);
    }

    // ── Connections ─────────────────────────────────────────────────

    /// Make `connection` the producer and mark the session connected.
    ///
    /// Returns the displaced producer, which is not closed.
    pub fn attach_producer(
        &mut self,
        connection: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        self.status = SessionStatus::Connected;
        self.producer.replace(connection)
    }

    /// Add a subscriber. The session holds only a weak reference.
    pub fn attach_subscriber(&mut self, connection: &Arc<ClientConnection>) {
        let _ = self
            .subscribers
            .insert(connection.id.clone(), Arc::downgrade(connection));
    }

    /// Whether `id` is the current producer.
    pub fn is_producer(&self, id: &ConnectionId) -> bool {
        self.producer.as_ref().is_some_and(|p| &p.id == id)
    }

    /// Detach the current producer if it is `id`. Sets status `disconnected`.
    pub fn detach_producer(&mut self, id: &ConnectionId) -> bool {
        if !self.is_producer(id) {
            return false;
        }
        self.producer = None;
        self.status = SessionStatus::Disconnected;
        true
    }

    /// Remove a subscriber.
    pub fn detach_subscriber(&mut self, id: &ConnectionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Whether a producer is attached.
    pub fn has_producer(&self) -> bool {
        self.producer.is_some()
    }

    /// Number of subscribers whose connection is still open.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .values()
            .filter(|weak| weak.upgrade().is_some_and(|c| c.is_open()))
            .count()
    }

    /// Drop subscriber entries whose connection is gone.
    pub fn prune_subscribers(&mut self) {
        self.subscribers
            .retain(|_, weak| weak.upgrade().is_some_and(|c| c.is_open()));
    }

    /// No producer and no live subscribers.
    pub fn is_orphaned(&mut self) -> bool {
        self.prune_subscribers();
        self.producer.is_none() && self.subscribers.is_empty()
    }

    /// Every open connection attached to the session, producer first.
    pub fn recipients(&self) -> Vec<Arc<ClientConnection>> {
        let producer = self.producer.iter().filter(|c| c.is_open()).cloned();
        let subscribers = self
            .subscribers
            .values()
            .filter_map(Weak::upgrade)
            .filter(|c| c.is_open());
        producer.chain(subscribers).collect()
    }

    // ── State ───────────────────────────────────────────────────────

    /// Append an event, evicting the oldest at capacity.
    ///
    /// Returns the number of retained events.
    pub fn push_event(&mut self, event: StoredEvent) -> usize {
        while self.events.len() >= self.capacity {
            let _ = self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_events += 1;
        self.events.len()
    }

    /// Number of retained events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Events ever ingested, including evicted ones.
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<StoredEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Shallow-merge into metrics and stamp `updatedAt`. Returns the result.
    pub fn merge_metrics(&mut self, partial: Map<String, Value>) -> Map<String, Value> {
        merge_stamped(&mut self.metrics, partial, self.last_activity_at)
    }

    /// Shallow-merge into config and stamp `updatedAt`. Returns the result.
    pub fn merge_config(&mut self, partial: Map<String, Value>) -> Map<String, Value> {
        merge_stamped(&mut self.config, partial, self.last_activity_at)
    }

    /// Current metrics map.
    pub fn metrics(&self) -> &Map<String, Value> {
        &self.metrics
    }

    /// Set the status.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
    }

    /// Point-in-time summary.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            status: self.status,
            producer_connected: self.producer.as_ref().is_some_and(|c| c.is_open()),
            subscriber_count: self.subscriber_count(),
            event_count: self.events.len(),
            total_events: self.total_events,
        }
    }

    /// Full state snapshot.
    pub fn state(&self) -> SessionState {
        SessionState {
            session_id: self.id.clone(),
            status: self.status,
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            events: self.events.iter().cloned().collect(),
            total_events: self.total_events,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

fn merge_stamped(
    target: &mut Map<String, Value>,
    partial: Map<String, Value>,
    stamp: i64,
) -> Map<String, Value> {
    for (key, value) in partial {
        let _ = target.insert(key, value);
    }
    let _ = target.insert(UPDATED_AT_KEY.into(), Value::from(stamp));
    target.clone()
}
