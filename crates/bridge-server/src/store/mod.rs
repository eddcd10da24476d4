//! In-memory session store.
//!
//! Sessions live in a [`DashMap`] keyed by id, each behind its own mutex.
//! Lock order: a map shard lock may be held while taking a session lock,
//! never the reverse. The global log lock is only ever taken while holding
//! a session lock (or no lock), never the other way around.

pub mod global_log;
pub mod session;

use std::sync::Arc;

use bridge_core::session::SessionSummary;
use bridge_core::{BridgeError, SessionId, now_millis};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::info;

pub use global_log::GlobalEventLog;
pub use session::Session;

use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_CREATED_TOTAL, SESSIONS_REMOVED_TOTAL};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Why a session left the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalReason {
    /// Last connection dropped.
    Orphaned,
    /// Idle past the timeout.
    Expired,
    /// Explicit API delete.
    Deleted,
}

impl RemovalReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Orphaned => "orphaned",
            Self::Expired => "expired",
            Self::Deleted => "deleted",
        }
    }
}

/// Registry of active sessions plus the global event log.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionHandle>,
    global_log: GlobalEventLog,
    event_buffer_size: usize,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new(event_buffer_size: usize, global_log_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            global_log: GlobalEventLog::new(global_log_size),
            event_buffer_size,
        }
    }

    /// The global event log.
    pub fn global_log(&self) -> &GlobalEventLog {
        &self.global_log
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Allocate a new session under a fresh id.
    pub fn create_session(&self) -> SessionHandle {
        let id = SessionId::new();
        let handle = self.new_handle(id.clone());
        let _ = self.sessions.insert(id, Arc::clone(&handle));
        handle
    }

    /// Look up a session.
    pub fn get_session(&self, id: &SessionId) -> Result<SessionHandle, BridgeError> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BridgeError::SessionNotFound(id.clone()))
    }

    /// Whether `handle` is still the live session registered under `id`.
    pub fn is_current(&self, id: &SessionId, handle: &SessionHandle) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), handle))
    }

    /// Resolve `id` (creating the session when absent or unknown) and run
    /// `attach` on it while the map entry is held.
    ///
    /// Holding the entry keeps a concurrent orphan cleanup from removing
    /// the session between lookup and attachment.
    pub fn attach<R>(
        &self,
        id: Option<SessionId>,
        attach: impl FnOnce(&mut Session) -> R,
    ) -> (SessionHandle, R) {
        let id = id.unwrap_or_default();
        match self.sessions.entry(id) {
            Entry::Occupied(entry) => {
                let handle = Arc::clone(entry.get());
                let result = attach(&mut *handle.lock());
                (handle, result)
            }
            Entry::Vacant(entry) => {
                let handle = self.new_handle(entry.key().clone());
                let result = attach(&mut *handle.lock());
                let _ = entry.insert(Arc::clone(&handle));
                (handle, result)
            }
        }
    }

    /// Point-in-time summaries of every session, oldest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut summaries: Vec<SessionSummary> =
            handles.iter().map(|handle| handle.lock().summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Remove a session. Connections are not closed.
    pub fn delete_session(&self, id: &SessionId) -> Result<(), BridgeError> {
        match self.sessions.remove(id) {
            Some((_, handle)) => {
                handle.lock().mark_removed();
                self.record_removal(id, RemovalReason::Deleted);
                Ok(())
            }
            None => Err(BridgeError::SessionNotFound(id.clone())),
        }
    }

    /// Remove `handle` from the store if it is still registered under `id`
    /// and has no producer and no live subscribers.
    pub fn remove_if_orphaned(&self, id: &SessionId, handle: &SessionHandle) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, current| {
                if !Arc::ptr_eq(current, handle) {
                    return false;
                }
                let mut session = current.lock();
                let orphaned = session.is_orphaned();
                if orphaned {
                    session.mark_removed();
                }
                orphaned
            })
            .is_some();
        if removed {
            self.record_removal(id, RemovalReason::Orphaned);
        }
        removed
    }

    /// Remove every session idle for longer than `idle_timeout_ms` as of
    /// `now`. Returns the removed ids.
    pub fn sweep_expired(&self, now: i64, idle_timeout_ms: i64) -> Vec<SessionId> {
        let mut expired = Vec::new();
        self.sessions.retain(|id, handle| {
            let mut session = handle.lock();
            let idle = now.saturating_sub(session.last_activity_at());
            if idle > idle_timeout_ms {
                session.mark_removed();
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        for id in &expired {
            self.record_removal(id, RemovalReason::Expired);
        }
        expired
    }

    /// Drop every session and the global log.
    pub fn shutdown(&self) {
        let count = self.sessions.len();
        for entry in &self.sessions {
            entry.value().lock().mark_removed();
        }
        self.sessions.clear();
        self.global_log.clear();
        gauge!(SESSIONS_ACTIVE).set(0.0);
        info!(sessions = count, "session store cleared");
    }

    fn new_handle(&self, id: SessionId) -> SessionHandle {
        info!(session_id = %id, "session created");
        counter!(SESSIONS_CREATED_TOTAL).increment(1);
        gauge!(SESSIONS_ACTIVE).increment(1.0);
        Arc::new(Mutex::new(Session::new(
            id,
            self.event_buffer_size,
            now_millis(),
        )))
    }

    fn record_removal(&self, id: &SessionId, reason: RemovalReason) {
        info!(session_id = %id, reason = reason.as_str(), "session removed");
        counter!(SESSIONS_REMOVED_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
    }
}
